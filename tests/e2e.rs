//! End-to-end rendering scenarios, driven entirely through the public `Context` API.

use rasterix::{
    BlendMode, Context, CullMode, DepthCompare, FragmentParam, IndexType, Mesh, PixelFormat, PrimitiveMode, ScalarType, Shader, Vec4, VertexParam,
};

fn f32s_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn collect_pixels(tex: &rasterix::Texture, w: u32, h: u32) -> Vec<[f32; 4]> {
    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            out.push(tex.read_rgba_f32(x, y, 0));
        }
    }
    out
}

fn vs_pos_color(p: VertexParam) -> [f32; 4] {
    let pos = p.attrib(0);
    let color = p.attrib(1);
    p.varyings_out[0] = color;
    [pos.x, pos.y, 0.0, 1.0]
}

fn fs_passthrough(p: FragmentParam) -> bool {
    p.outputs_out[0] = p.varyings_in[0];
    true
}

/// Scenario 1: single colored triangle, no depth. Gradient inside, magenta untouched outside.
#[test]
fn scenario1_single_triangle_gradient() {
    let (w, h) = (64u32, 48u32);
    let mut ctx = Context::new();

    let verts = [-0.5f32, -0.5, 1.0, 0.0, 0.0, 0.5, -0.5, 0.0, 0.0, 1.0, 0.0, 0.5, 0.0, 1.0, 0.0];
    let vbo = ctx.create_vbo(verts.len() * 4).unwrap();
    ctx.write_vbo(vbo, 0, &f32s_to_bytes(&verts)).unwrap();
    let vao = ctx.create_vao(vbo).unwrap();
    ctx.set_vao_binding(vao, 0, 0, 20, 2, ScalarType::F32).unwrap();
    ctx.set_vao_binding(vao, 1, 8, 20, 3, ScalarType::F32).unwrap();
    let ibo = ctx.create_ibo(3, IndexType::U8).unwrap();
    ctx.write_ibo(ibo, 0, &[0, 2, 1]).unwrap();
    ctx.set_vao_index_buffer(vao, ibo).unwrap();

    let shader = ctx
        .create_shader(Shader::new(vs_pos_color, fs_passthrough).with_varyings(1).with_outputs(1).with_cull_mode(CullMode::Off))
        .unwrap();

    let tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, tex).unwrap();
    ctx.clear_color(fbo, 0, [1.0, 0.0, 1.0, 1.0]).unwrap();

    let mesh = Mesh::new(vao, PrimitiveMode::IndexedTriangles, 0, 3);
    ctx.draw(fbo, &mesh, shader).unwrap();

    let tex_ref = ctx.get_texture(tex).unwrap();
    let centroid = tex_ref.read_rgba_f32(w / 2, h / 2 + 4, 0);
    assert_ne!(centroid, [1.0, 0.0, 1.0, 1.0], "centroid should be interpolated, not background");
    let corner = tex_ref.read_rgba_f32(1, 1, 0);
    assert_eq!(corner, [1.0, 0.0, 1.0, 1.0], "corner outside the triangle should stay magenta");
}

fn vs_pos3(p: VertexParam) -> [f32; 4] {
    let pos = p.attrib(0);
    [pos.x, pos.y, pos.z, 1.0]
}

fn fs_blue(p: FragmentParam) -> bool {
    p.outputs_out[0] = Vec4::new(0.0, 0.0, 1.0, 1.0);
    true
}

fn fs_red(p: FragmentParam) -> bool {
    p.outputs_out[0] = Vec4::new(1.0, 0.0, 0.0, 1.0);
    true
}

fn quad_vao(ctx: &mut Context, z: f32) -> rasterix::Handle<rasterix::VertexArrayDescriptor> {
    let verts = [-1.0f32, -1.0, z, 1.0, -1.0, z, 1.0, 1.0, z, -1.0, 1.0, z];
    let vbo = ctx.create_vbo(verts.len() * 4).unwrap();
    ctx.write_vbo(vbo, 0, &f32s_to_bytes(&verts)).unwrap();
    let vao = ctx.create_vao(vbo).unwrap();
    ctx.set_vao_binding(vao, 0, 0, 12, 3, ScalarType::F32).unwrap();
    let ibo = ctx.create_ibo(6, IndexType::U8).unwrap();
    ctx.write_ibo(ibo, 0, &[0, 1, 2, 0, 2, 3]).unwrap();
    ctx.set_vao_index_buffer(vao, ibo).unwrap();
    vao
}

/// Scenario 2: two coplanar full-screen quads, blue at z=0.4 drawn first, red at z=0.5 drawn
/// second with `LessEqual` depth test — the red quad must fail depth test and the framebuffer
/// stays blue.
#[test]
fn scenario2_depth_reject() {
    let (w, h) = (16u32, 16u32);
    let mut ctx = Context::new();

    let vao_blue = quad_vao(&mut ctx, 0.4);
    let vao_red = quad_vao(&mut ctx, 0.5);

    let shader_blue = ctx
        .create_shader(Shader::new(vs_pos3, fs_blue).with_varyings(0).with_outputs(1).with_depth_test(DepthCompare::LessEqual).with_depth_write(true))
        .unwrap();
    let shader_red = ctx
        .create_shader(Shader::new(vs_pos3, fs_red).with_varyings(0).with_outputs(1).with_depth_test(DepthCompare::LessEqual).with_depth_write(true))
        .unwrap();

    let color_tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let depth_tex = ctx.create_texture(PixelFormat::R_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, color_tex).unwrap();
    ctx.attach_depth(fbo, depth_tex).unwrap();
    ctx.clear_color(fbo, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();
    ctx.clear_depth(fbo, 1.0).unwrap();

    let mesh_blue = Mesh::new(vao_blue, PrimitiveMode::IndexedTriangles, 0, 6);
    let mesh_red = Mesh::new(vao_red, PrimitiveMode::IndexedTriangles, 0, 6);
    ctx.draw(fbo, &mesh_blue, shader_blue).unwrap();
    ctx.draw(fbo, &mesh_red, shader_red).unwrap();

    let tex_ref = ctx.get_texture(color_tex).unwrap();
    assert_eq!(tex_ref.read_rgba_f32(w / 2, h / 2, 0), [0.0, 0.0, 1.0, 1.0]);
}

fn fs_half_alpha_red(p: FragmentParam) -> bool {
    p.outputs_out[0] = Vec4::new(1.0, 0.0, 0.0, 0.5);
    true
}

/// Scenario 3: alpha-blended constant-color quad over an opaque black background.
#[test]
fn scenario3_blend_alpha() {
    let (w, h) = (16u32, 16u32);
    let mut ctx = Context::new();
    let vao = quad_vao(&mut ctx, 0.0);
    let shader = ctx
        .create_shader(Shader::new(vs_pos3, fs_half_alpha_red).with_varyings(0).with_outputs(1).with_blend_mode(BlendMode::Alpha))
        .unwrap();

    let tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, tex).unwrap();
    ctx.clear_color(fbo, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();

    let mesh = Mesh::new(vao, PrimitiveMode::IndexedTriangles, 0, 6);
    ctx.draw(fbo, &mesh, shader).unwrap();

    let tex_ref = ctx.get_texture(tex).unwrap();
    let got = tex_ref.read_rgba_f32(w / 2, h / 2, 0);
    assert!((got[0] - 0.5).abs() < 1e-4);
    assert!((got[1] - 0.0).abs() < 1e-4);
    assert!((got[2] - 0.0).abs() < 1e-4);
    assert!((got[3] - 1.0).abs() < 1e-4);
}

fn vs_clip_w(p: VertexParam) -> [f32; 4] {
    match p.vert_id {
        0 => [0.0, 0.0, 0.0, -1.0],
        1 => [0.5, -0.5, 0.0, 1.0],
        _ => [0.5, 0.5, 0.0, 1.0],
    }
}

fn fs_white(p: FragmentParam) -> bool {
    p.outputs_out[0] = Vec4::new(1.0, 1.0, 1.0, 1.0);
    true
}

/// Scenario 4: a triangle with one vertex behind the eye (`w < 0`) is homogeneously clipped
/// rather than dropped outright or crashed on, and the clipped polygon rasterizes a nonempty set
/// of pixels.
#[test]
fn scenario4_homogeneous_clip_produces_fragments() {
    let (w, h) = (32u32, 32u32);
    let mut ctx = Context::new();

    let dummy_vbo = ctx.create_vbo(4).unwrap();
    let vao = ctx.create_vao(dummy_vbo).unwrap();
    let shader = ctx
        .create_shader(Shader::new(vs_clip_w, fs_white).with_varyings(0).with_outputs(1).with_cull_mode(CullMode::Off))
        .unwrap();

    let tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, tex).unwrap();
    ctx.clear_color(fbo, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();

    let mesh = Mesh::new(vao, PrimitiveMode::Triangles, 0, 3);
    ctx.draw(fbo, &mesh, shader).unwrap();

    let tex_ref = ctx.get_texture(tex).unwrap();
    let lit = collect_pixels(tex_ref, w, h).into_iter().filter(|&p| p != [0.0, 0.0, 0.0, 1.0]).count();
    assert!(lit > 0, "clipped triangle should still rasterize some pixels");
}

/// Scenario 5: drawing the same triangle via explicit `Triangles` mode and via
/// `IndexedTriangles` with a trivial identity index order must produce byte-identical
/// framebuffers.
#[test]
fn scenario5_indexed_vs_nonindexed_equivalence() {
    let (w, h) = (48u32, 48u32);
    let mut ctx = Context::new();

    let verts = [-0.6f32, -0.6, 1.0, 1.0, 1.0, 0.6, -0.6, 1.0, 1.0, 1.0, 0.0, 0.6, 1.0, 1.0, 1.0];

    let vbo_a = ctx.create_vbo(verts.len() * 4).unwrap();
    ctx.write_vbo(vbo_a, 0, &f32s_to_bytes(&verts)).unwrap();
    let vao_a = ctx.create_vao(vbo_a).unwrap();
    ctx.set_vao_binding(vao_a, 0, 0, 20, 2, ScalarType::F32).unwrap();
    ctx.set_vao_binding(vao_a, 1, 8, 20, 3, ScalarType::F32).unwrap();

    let vbo_b = ctx.create_vbo(verts.len() * 4).unwrap();
    ctx.write_vbo(vbo_b, 0, &f32s_to_bytes(&verts)).unwrap();
    let vao_b = ctx.create_vao(vbo_b).unwrap();
    ctx.set_vao_binding(vao_b, 0, 0, 20, 2, ScalarType::F32).unwrap();
    ctx.set_vao_binding(vao_b, 1, 8, 20, 3, ScalarType::F32).unwrap();
    let ibo = ctx.create_ibo(3, IndexType::U8).unwrap();
    ctx.write_ibo(ibo, 0, &[0, 1, 2]).unwrap();
    ctx.set_vao_index_buffer(vao_b, ibo).unwrap();

    let shader = ctx
        .create_shader(Shader::new(vs_pos_color, fs_passthrough).with_varyings(1).with_outputs(1).with_cull_mode(CullMode::Off))
        .unwrap();

    let tex_a = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo_a = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo_a, 0, tex_a).unwrap();
    ctx.clear_color(fbo_a, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();
    ctx.draw(fbo_a, &Mesh::new(vao_a, PrimitiveMode::Triangles, 0, 3), shader).unwrap();

    let tex_b = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo_b = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo_b, 0, tex_b).unwrap();
    ctx.clear_color(fbo_b, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();
    ctx.draw(fbo_b, &Mesh::new(vao_b, PrimitiveMode::IndexedTriangles, 0, 3), shader).unwrap();

    let a = collect_pixels(ctx.get_texture(tex_a).unwrap(), w, h);
    let b = collect_pixels(ctx.get_texture(tex_b).unwrap(), w, h);
    assert_eq!(a, b, "indexed and non-indexed draws of the same triangle must match byte-for-byte");
}

/// Scenario 6: with blending off, the rendered framebuffer is independent of thread count.
#[test]
fn scenario6_thread_count_invariance() {
    let (w, h) = (48u32, 48u32);
    let mut ctx = Context::new();

    let verts = [-0.6f32, -0.6, 1.0, 1.0, 1.0, 0.6, -0.6, 1.0, 1.0, 1.0, 0.0, 0.6, 1.0, 1.0, 1.0];
    let vbo = ctx.create_vbo(verts.len() * 4).unwrap();
    ctx.write_vbo(vbo, 0, &f32s_to_bytes(&verts)).unwrap();
    let vao = ctx.create_vao(vbo).unwrap();
    ctx.set_vao_binding(vao, 0, 0, 20, 2, ScalarType::F32).unwrap();
    ctx.set_vao_binding(vao, 1, 8, 20, 3, ScalarType::F32).unwrap();

    let shader = ctx
        .create_shader(Shader::new(vs_pos_color, fs_passthrough).with_varyings(1).with_outputs(1).with_cull_mode(CullMode::Off))
        .unwrap();
    let mesh = Mesh::new(vao, PrimitiveMode::Triangles, 0, 3);

    let mut results = Vec::new();
    for n in [1usize, 2, 4] {
        ctx.set_num_threads(n);
        let tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
        let fbo = ctx.create_framebuffer(w, h).unwrap();
        ctx.attach_color(fbo, 0, tex).unwrap();
        ctx.clear_color(fbo, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();
        ctx.draw(fbo, &mesh, shader).unwrap();
        results.push(collect_pixels(ctx.get_texture(tex).unwrap(), w, h));
    }
    for r in &results[1..] {
        assert_eq!(&results[0], r, "thread count must not change the rasterized framebuffer when blending is off");
    }
}

fn fs_discard_all(_p: FragmentParam) -> bool {
    false
}

/// A shader that discards every fragment must leave the framebuffer and depth buffer
/// byte-identical to their pre-draw state.
#[test]
fn discard_all_leaves_framebuffer_unchanged() {
    let (w, h) = (32u32, 32u32);
    let mut ctx = Context::new();
    let vao = quad_vao(&mut ctx, 0.5);
    let shader = ctx
        .create_shader(Shader::new(vs_pos3, fs_discard_all).with_varyings(0).with_outputs(1).with_depth_test(DepthCompare::LessEqual).with_depth_write(true))
        .unwrap();

    let color_tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let depth_tex = ctx.create_texture(PixelFormat::R_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, color_tex).unwrap();
    ctx.attach_depth(fbo, depth_tex).unwrap();
    ctx.clear_color(fbo, 0, [0.2, 0.3, 0.4, 1.0]).unwrap();
    ctx.clear_depth(fbo, 1.0).unwrap();

    let before_color = collect_pixels(ctx.get_texture(color_tex).unwrap(), w, h);
    let before_depth = collect_pixels(ctx.get_texture(depth_tex).unwrap(), w, h);

    ctx.draw(fbo, &Mesh::new(vao, PrimitiveMode::IndexedTriangles, 0, 6), shader).unwrap();

    let after_color = collect_pixels(ctx.get_texture(color_tex).unwrap(), w, h);
    let after_depth = collect_pixels(ctx.get_texture(depth_tex).unwrap(), w, h);
    assert_eq!(before_color, after_color);
    assert_eq!(before_depth, after_depth);
}

fn vs_degenerate(p: VertexParam) -> [f32; 4] {
    // All three vertices collapse onto the same point: zero-area triangle.
    let _ = p.vert_id;
    [0.1, 0.1, 0.0, 1.0]
}

/// A degenerate (zero-area) triangle produces no fragments.
#[test]
fn degenerate_triangle_produces_no_fragments() {
    let (w, h) = (16u32, 16u32);
    let mut ctx = Context::new();
    let dummy_vbo = ctx.create_vbo(4).unwrap();
    let vao = ctx.create_vao(dummy_vbo).unwrap();
    let shader = ctx
        .create_shader(Shader::new(vs_degenerate, fs_white).with_varyings(0).with_outputs(1).with_cull_mode(CullMode::Off))
        .unwrap();

    let tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    let fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(fbo, 0, tex).unwrap();
    ctx.clear_color(fbo, 0, [0.0, 0.0, 0.0, 1.0]).unwrap();

    ctx.draw(fbo, &Mesh::new(vao, PrimitiveMode::Triangles, 0, 3), shader).unwrap();

    let lit = collect_pixels(ctx.get_texture(tex).unwrap(), w, h).into_iter().filter(|&p| p != [0.0, 0.0, 0.0, 1.0]).count();
    assert_eq!(lit, 0, "a zero-area triangle must rasterize nothing");
}

/// `blit(tex, tex, full, full)` with identical source/destination rects is the identity.
#[test]
fn blit_full_rect_round_trip_is_identity() {
    use rasterix::Rect;

    let (w, h) = (8u32, 6u32);
    let mut ctx = Context::new();

    let src_tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();
    for y in 0..h {
        for x in 0..w {
            ctx.get_texture_mut(src_tex).unwrap().write_rgba_f32(x, y, 0, [x as f32, y as f32, 0.5, 1.0]);
        }
    }
    let dst_tex = ctx.create_texture(PixelFormat::RGBA_F32, w, h, 1).unwrap();

    let src_fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(src_fbo, 0, src_tex).unwrap();
    let dst_fbo = ctx.create_framebuffer(w, h).unwrap();
    ctx.attach_color(dst_fbo, 0, dst_tex).unwrap();

    let full = Rect { x0: 0, x1: w, y0: 0, y1: h };
    ctx.blit(src_fbo, 0, full, dst_fbo, 0, full).unwrap();

    let before = collect_pixels(ctx.get_texture(src_tex).unwrap(), w, h);
    let after = collect_pixels(ctx.get_texture(dst_tex).unwrap(), w, h);
    assert_eq!(before, after);
}

/// Blitting a half-width source rect into a full-width destination rect scales up, nearest-neighbor.
#[test]
fn blit_scales_between_differently_sized_rects() {
    use rasterix::Rect;

    let mut ctx = Context::new();
    let src_tex = ctx.create_texture(PixelFormat::RGBA_F32, 2, 2, 1).unwrap();
    ctx.get_texture_mut(src_tex).unwrap().write_rgba_f32(0, 0, 0, [1.0, 0.0, 0.0, 1.0]);
    ctx.get_texture_mut(src_tex).unwrap().write_rgba_f32(1, 0, 0, [0.0, 1.0, 0.0, 1.0]);
    ctx.get_texture_mut(src_tex).unwrap().write_rgba_f32(0, 1, 0, [0.0, 0.0, 1.0, 1.0]);
    ctx.get_texture_mut(src_tex).unwrap().write_rgba_f32(1, 1, 0, [1.0, 1.0, 0.0, 1.0]);
    let dst_tex = ctx.create_texture(PixelFormat::RGBA_F32, 4, 4, 1).unwrap();

    let src_fbo = ctx.create_framebuffer(2, 2).unwrap();
    ctx.attach_color(src_fbo, 0, src_tex).unwrap();
    let dst_fbo = ctx.create_framebuffer(4, 4).unwrap();
    ctx.attach_color(dst_fbo, 0, dst_tex).unwrap();

    ctx.blit(src_fbo, 0, Rect { x0: 0, x1: 2, y0: 0, y1: 2 }, dst_fbo, 0, Rect { x0: 0, x1: 4, y0: 0, y1: 4 }).unwrap();

    let dst = ctx.get_texture(dst_tex).unwrap();
    assert_eq!(dst.read_rgba_f32(0, 0, 0), [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(dst.read_rgba_f32(3, 0, 0), [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(dst.read_rgba_f32(0, 3, 0), [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(dst.read_rgba_f32(3, 3, 0), [1.0, 1.0, 0.0, 1.0]);
}
