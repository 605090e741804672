//! Cameras
//!
//! The renderer only needs a view matrix, a projection and the eye; the
//! [`Camera`] trait is the seam. [`FlyCamera`] is a free-look camera driven
//! by yaw/pitch angles.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Read-only camera interface used by the passes
pub trait Camera {
    fn view_matrix(&self) -> Mat4;

    fn projection_matrix(&self, aspect: f32) -> Mat4;

    fn eye_position(&self) -> Vec3;

    /// Unit view direction
    fn forward(&self) -> Vec3;
}

/// Movement directions, relative to the view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Free-look perspective camera
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlyCamera {
    /// Eye position
    pub position: Vec3,
    /// Heading, degrees (-90 looks down -Z)
    pub yaw: f32,
    /// Elevation, degrees, kept within ±89
    pub pitch: f32,
    /// Vertical field of view, degrees
    pub zoom: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Units per second
    pub speed: f32,
    /// Degrees per unit of look input
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl FlyCamera {
    pub const MAX_PITCH: f32 = 89.0;
    pub const MIN_ZOOM: f32 = 1.0;
    pub const MAX_ZOOM: f32 = 45.0;

    /// Camera at `position` looking down -Z
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: -90.0,
            pitch: 0.0,
            zoom: Self::MAX_ZOOM,
            near: 0.1,
            far: 100.0,
            speed: 2.5,
            sensitivity: 0.1,
        }
    }

    /// Camera at `position` looking at `target`
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self::new(position);
        let direction = (target - position).normalize_or_zero();
        if direction != Vec3::ZERO {
            let pitch = direction.y.clamp(-1.0, 1.0).asin().to_degrees();
            camera.pitch = pitch.clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
            camera.yaw = direction.z.atan2(direction.x).to_degrees();
        }
        camera
    }

    /// Right vector, horizontal
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or_zero()
    }

    /// Up vector relative to the view
    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward()).normalize_or_zero()
    }

    /// Move along a view-relative direction for `dt` seconds
    pub fn process_movement(&mut self, movement: CameraMovement, dt: f32) {
        let step = self.speed * dt;
        let offset = match movement {
            CameraMovement::Forward => self.forward(),
            CameraMovement::Backward => -self.forward(),
            CameraMovement::Right => self.right(),
            CameraMovement::Left => -self.right(),
            CameraMovement::Up => Vec3::Y,
            CameraMovement::Down => Vec3::NEG_Y,
        };
        self.position += offset * step;
    }

    /// Turn by look input deltas
    pub fn process_look(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Narrow or widen the field of view
    pub fn process_zoom(&mut self, delta: f32) {
        self.zoom = (self.zoom - delta).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
    }
}

impl Camera for FlyCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.zoom.to_radians(), aspect, self.near, self.far)
    }

    fn eye_position(&self) -> Vec3 {
        self.position
    }

    fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }
}
