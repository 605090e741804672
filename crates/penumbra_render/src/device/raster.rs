//! Triangle rasterizer for the software device
//!
//! Clip-space triangles are clipped against `w > 0` and the near and far
//! planes, divided, mapped through the viewport and scan-converted with edge
//! functions. Depth is interpolated linearly in window space, varyings with
//! perspective correction. Each covered pixel runs a [`FragmentShader`].

use glam::{Vec2, Vec3, Vec4};

use super::{CullFace, CullState, DepthState, Rect};

const W_EPSILON: f32 = 1e-6;

/// Pixel planes a triangle lands on
pub(super) struct Surface<'a> {
    pub width: u32,
    pub height: u32,
    pub depth: &'a mut [f32],
    pub colour: Option<&'a mut [Vec4]>,
}

/// Fixed-function state for one draw
pub(super) struct RasterState {
    pub viewport: Rect,
    pub scissor: Option<Rect>,
    pub cull: CullState,
    pub depth: DepthState,
}

/// Attributes interpolated across a triangle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(super) struct Varyings {
    /// Object-space position
    pub local: Vec3,
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Varyings {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            local: self.local.lerp(other.local, t),
            world: self.world.lerp(other.world, t),
            normal: self.normal.lerp(other.normal, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }

    fn blend(corners: [&Self; 3], weights: [f32; 3]) -> Self {
        let [a, b, c] = corners;
        let [wa, wb, wc] = weights;
        Self {
            local: a.local * wa + b.local * wb + c.local * wc,
            world: a.world * wa + b.world * wb + c.world * wc,
            normal: a.normal * wa + b.normal * wb + c.normal * wc,
            uv: a.uv * wa + b.uv * wb + c.uv * wc,
        }
    }
}

/// Clip-space vertex
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct ClipVertex {
    pub position: Vec4,
    pub varyings: Varyings,
}

impl ClipVertex {
    pub fn new(position: Vec4, varyings: Varyings) -> Self {
        Self { position, varyings }
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            position: self.position + (other.position - self.position) * t,
            varyings: self.varyings.lerp(&other.varyings, t),
        }
    }
}

/// Per-fragment stage of a draw
pub(super) trait FragmentShader {
    /// Depth the fragment is tested and stored with
    fn depth(&self, _varyings: &Varyings, window_depth: f32) -> f32 {
        window_depth
    }

    /// Colour written when the fragment survives the depth test
    fn colour(&self, varyings: &Varyings) -> Vec4;
}

#[derive(Clone, Copy)]
struct WindowVertex {
    position: Vec3,
    inv_w: f32,
    varyings: Varyings,
}

fn clip_against(polygon: &[ClipVertex], distance: impl Fn(Vec4) -> f32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, a) in polygon.iter().enumerate() {
        let b = &polygon[(i + 1) % polygon.len()];
        let da = distance(a.position);
        let db = distance(b.position);
        if da >= 0.0 {
            out.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            out.push(a.lerp(b, da / (da - db)));
        }
    }
    out
}

/// Clip a triangle to the visible volume, returning a convex polygon
pub(super) fn clip_triangle(triangle: [ClipVertex; 3]) -> Vec<ClipVertex> {
    let polygon = clip_against(&triangle, |p| p.w - W_EPSILON);
    if polygon.len() < 3 {
        return polygon;
    }
    let polygon = clip_against(&polygon, |p| p.z + p.w);
    if polygon.len() < 3 {
        return polygon;
    }
    clip_against(&polygon, |p| p.w - p.z)
}

fn to_window(vertex: &ClipVertex, viewport: &Rect) -> WindowVertex {
    let clip = vertex.position;
    let ndc = clip.truncate() / clip.w;
    WindowVertex {
        position: Vec3::new(
            viewport.x as f32 + (ndc.x + 1.0) * 0.5 * viewport.width as f32,
            viewport.y as f32 + (ndc.y + 1.0) * 0.5 * viewport.height as f32,
            (ndc.z * 0.5 + 0.5).clamp(0.0, 1.0),
        ),
        inv_w: 1.0 / clip.w,
        varyings: vertex.varyings,
    }
}

fn edge(a: Vec3, b: Vec3, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Rasterize one clip-space triangle, returning the number of fragments written
pub(super) fn draw_triangle(
    triangle: [ClipVertex; 3],
    state: &RasterState,
    shader: &dyn FragmentShader,
    surface: &mut Surface,
) -> u32 {
    let polygon = clip_triangle(triangle);
    if polygon.len() < 3 {
        return 0;
    }

    let window: Vec<WindowVertex> = polygon.iter().map(|v| to_window(v, &state.viewport)).collect();
    let mut written = 0;
    for i in 1..window.len() - 1 {
        written += fill([window[0], window[i], window[i + 1]], state, shader, surface);
    }
    written
}

// Pixels exactly on a shared edge belong to one triangle only
fn owns_edge(a: Vec3, b: Vec3) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

fn covers(w: f32, a: Vec3, b: Vec3) -> bool {
    w > 0.0 || (w == 0.0 && owns_edge(a, b))
}

fn fill(
    corners: [WindowVertex; 3],
    state: &RasterState,
    shader: &dyn FragmentShader,
    surface: &mut Surface,
) -> u32 {
    let [c0, c1, c2] = corners;
    let area = edge(c0.position, c1.position, c2.position.x, c2.position.y);
    if area.abs() < f32::EPSILON {
        return 0;
    }

    let front = area > 0.0;
    if state.cull.enabled {
        let culled = match state.cull.face {
            CullFace::Back => !front,
            CullFace::Front => front,
        };
        if culled {
            return 0;
        }
    }

    // Counter-clockwise from here on
    let (c1, c2, area) = if front { (c1, c2, area) } else { (c2, c1, -area) };
    let (v0, v1, v2) = (c0.position, c1.position, c2.position);
    let flat_depth = (v0.z == v1.z && v1.z == v2.z).then_some(v0.z);

    let mut region = state.viewport.intersect(&Rect::from_size(surface.width, surface.height));
    if let Some(scissor) = &state.scissor {
        region = region.intersect(scissor);
    }
    if region.width == 0 || region.height == 0 {
        return 0;
    }

    let min_x = v0.x.min(v1.x).min(v2.x).floor().max(region.x as f32) as i32;
    let max_x = v0.x.max(v1.x).max(v2.x).ceil();
    let max_x = max_x.min((region.x + region.width as i32) as f32) as i32;
    let min_y = v0.y.min(v1.y).min(v2.y).floor().max(region.y as f32) as i32;
    let max_y = v0.y.max(v1.y).max(v2.y).ceil();
    let max_y = max_y.min((region.y + region.height as i32) as f32) as i32;

    let mut written = 0;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            let w0 = edge(v1, v2, px, py);
            let w1 = edge(v2, v0, px, py);
            let w2 = edge(v0, v1, px, py);
            if !(covers(w0, v1, v2) && covers(w1, v2, v0) && covers(w2, v0, v1)) {
                continue;
            }

            let window_depth = match flat_depth {
                Some(depth) => depth,
                None => ((w0 * v0.z + w1 * v1.z + w2 * v2.z) / area).clamp(0.0, 1.0),
            };

            let perspective = [w0 * c0.inv_w, w1 * c1.inv_w, w2 * c2.inv_w];
            let total: f32 = perspective.iter().sum();
            if total == 0.0 || !total.is_finite() {
                continue;
            }
            let weights = perspective.map(|w| w / total);
            let varyings = Varyings::blend([&c0.varyings, &c1.varyings, &c2.varyings], weights);

            let depth = shader.depth(&varyings, window_depth).clamp(0.0, 1.0);
            let index = y as usize * surface.width as usize + x as usize;

            if state.depth.test {
                if !state.depth.func.passes(depth, surface.depth[index]) {
                    continue;
                }
                if state.depth.write {
                    surface.depth[index] = depth;
                }
            }

            if let Some(colour) = surface.colour.as_deref_mut() {
                colour[index] = shader.colour(&varyings);
            }
            written += 1;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DepthFunc;

    struct Solid(Vec4);

    impl FragmentShader for Solid {
        fn colour(&self, _varyings: &Varyings) -> Vec4 {
            self.0
        }
    }

    /// Writes the interpolated uv as colour and its u as depth
    struct UvDepth;

    impl FragmentShader for UvDepth {
        fn depth(&self, varyings: &Varyings, _window_depth: f32) -> f32 {
            varyings.uv.x
        }

        fn colour(&self, varyings: &Varyings) -> Vec4 {
            varyings.uv.extend(0.0).extend(1.0)
        }
    }

    const WHITE: Solid = Solid(Vec4::ONE);

    fn state(width: u32, height: u32) -> RasterState {
        RasterState {
            viewport: Rect::from_size(width, height),
            scissor: None,
            cull: CullState::default(),
            depth: DepthState::default(),
        }
    }

    fn vertex(x: f32, y: f32, z: f32, w: f32, uv: Vec2) -> ClipVertex {
        ClipVertex::new(
            Vec4::new(x * w, y * w, z * w, w),
            Varyings { uv, ..Varyings::default() },
        )
    }

    fn full_screen(z: f32) -> [[ClipVertex; 3]; 2] {
        let v = |x: f32, y: f32| vertex(x, y, z, 1.0, Vec2::new(x, y) * 0.5 + 0.5);
        [
            [v(-1.0, -1.0), v(1.0, -1.0), v(1.0, 1.0)],
            [v(-1.0, -1.0), v(1.0, 1.0), v(-1.0, 1.0)],
        ]
    }

    fn draw_all(
        triangles: [[ClipVertex; 3]; 2],
        state: &RasterState,
        shader: &dyn FragmentShader,
        surface: &mut Surface,
    ) -> u32 {
        triangles
            .into_iter()
            .map(|tri| draw_triangle(tri, state, shader, surface))
            .sum()
    }

    #[test]
    fn test_full_screen_quad_covers_every_pixel() {
        let mut depth = vec![1.0; 16];
        let mut surface = Surface { width: 4, height: 4, depth: &mut depth, colour: None };

        let written = draw_all(full_screen(0.0), &state(4, 4), &WHITE, &mut surface);

        assert_eq!(written, 16);
        assert!(depth.iter().all(|&d| (d - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_depth_write_mask() {
        let mut depth = vec![1.0; 16];
        let mut colour = vec![Vec4::ZERO; 16];
        let mut surface = Surface {
            width: 4,
            height: 4,
            depth: &mut depth,
            colour: Some(colour.as_mut_slice()),
        };
        let mut state = state(4, 4);
        state.depth.write = false;

        draw_all(full_screen(0.0), &state, &WHITE, &mut surface);

        assert!(depth.iter().all(|&d| d == 1.0));
        assert!(colour.iter().all(|&c| c == Vec4::ONE));
    }

    #[test]
    fn test_far_plane_triangle_survives_less_equal() {
        let mut depth = vec![1.0; 16];
        let mut surface = Surface { width: 4, height: 4, depth: &mut depth, colour: None };
        let mut state = state(4, 4);
        state.depth.func = DepthFunc::LessEqual;

        assert_eq!(draw_all(full_screen(1.0), &state, &WHITE, &mut surface), 16);

        state.depth.func = DepthFunc::Less;
        assert_eq!(draw_all(full_screen(1.0), &state, &WHITE, &mut surface), 0);
    }

    #[test]
    fn test_back_face_culling() {
        let mut depth = vec![1.0; 16];
        let mut surface = Surface { width: 4, height: 4, depth: &mut depth, colour: None };
        let mut state = state(4, 4);
        state.cull = CullState { enabled: true, face: CullFace::Back };

        let [ccw, _] = full_screen(0.0);
        let cw = [ccw[0], ccw[2], ccw[1]];
        assert!(draw_triangle(ccw, &state, &WHITE, &mut surface) > 0);
        assert_eq!(draw_triangle(cw, &state, &WHITE, &mut surface), 0);

        state.cull.face = CullFace::Front;
        assert_eq!(draw_triangle(ccw, &state, &WHITE, &mut surface), 0);
    }

    #[test]
    fn test_triangle_behind_eye_is_clipped() {
        let behind = |x: f32, y: f32| {
            ClipVertex::new(Vec4::new(x, y, 0.0, -1.0), Varyings::default())
        };
        let polygon = clip_triangle([behind(0.0, 0.0), behind(1.0, 0.0), behind(0.0, 1.0)]);
        assert!(polygon.len() < 3);
    }

    #[test]
    fn test_scissor_limits_fragments() {
        let mut depth = vec![1.0; 16];
        let mut surface = Surface { width: 4, height: 4, depth: &mut depth, colour: None };
        let mut state = state(4, 4);
        state.scissor = Some(Rect::new(0, 0, 2, 2));

        assert_eq!(draw_all(full_screen(0.0), &state, &WHITE, &mut surface), 4);
        assert_eq!(depth[0], 0.5);
        assert_eq!(depth[15], 1.0);
    }

    #[test]
    fn test_shader_depth_replaces_window_depth() {
        let mut depth = vec![1.0; 16];
        let mut colour = vec![Vec4::ZERO; 16];
        let mut surface = Surface {
            width: 4,
            height: 4,
            depth: &mut depth,
            colour: Some(colour.as_mut_slice()),
        };

        draw_all(full_screen(0.0), &state(4, 4), &UvDepth, &mut surface);

        // Pixel centres sit at u = 0.125, 0.375, 0.625, 0.875
        assert!((depth[0] - 0.125).abs() < 1e-5);
        assert!((depth[3] - 0.875).abs() < 1e-5);
        assert!((colour[15].y - 0.875).abs() < 1e-5);
    }

    #[test]
    fn test_varyings_are_perspective_correct() {
        // Near edge at w = 1, far edge at w = 3; uv.y runs 0 to 1 across them
        let triangles = [
            [
                vertex(-1.0, -1.0, 0.0, 1.0, Vec2::new(0.0, 0.0)),
                vertex(1.0, -1.0, 0.0, 1.0, Vec2::new(1.0, 0.0)),
                vertex(1.0, 1.0, 0.0, 3.0, Vec2::new(1.0, 1.0)),
            ],
            [
                vertex(-1.0, -1.0, 0.0, 1.0, Vec2::new(0.0, 0.0)),
                vertex(1.0, 1.0, 0.0, 3.0, Vec2::new(1.0, 1.0)),
                vertex(-1.0, 1.0, 0.0, 3.0, Vec2::new(0.0, 1.0)),
            ],
        ];
        let mut depth = vec![1.0; 4];
        let mut colour = vec![Vec4::ZERO; 4];
        let mut surface = Surface {
            width: 2,
            height: 2,
            depth: &mut depth,
            colour: Some(colour.as_mut_slice()),
        };
        let mut state = state(2, 2);
        state.depth.test = false;

        draw_all(triangles, &state, &UvDepth, &mut surface);

        // Screen-space halfway at y = 0.25 maps to t = 0.25 / (0.25 + 0.75 * 3)
        let lower = colour[0].y;
        assert!((lower - 0.1).abs() < 1e-4, "lower row uv.y {}", lower);
        assert!(lower < 0.25);
    }
}
