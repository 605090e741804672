//! Skybox
//!
//! A cube map drawn behind the scene. The view loses its translation so the
//! box follows the eye; depth writes are off and the test is relaxed to
//! less-or-equal so the box sits at the far plane without occluding anything.

use std::path::Path;

use glam::{Mat3, Mat4};
use image::RgbaImage;
use penumbra_shader::{ShaderCompiler, ShaderSourceProvider, SKYBOX_PROGRAM};

use crate::device::{DepthFunc, DepthState, MeshId, RenderDevice, TextureId};
use crate::error::{RenderError, Result};
use crate::primitives;
use crate::program::ShaderProgram;

/// Face file names in cube order (+X, -X, +Y, -Y, +Z, -Z)
pub const FACE_NAMES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

/// Cube map, cube mesh and skybox program
#[derive(Debug)]
pub struct Skybox {
    program: ShaderProgram,
    mesh: MeshId,
    cubemap: TextureId,
}

impl Skybox {
    /// Upload six faces and link the skybox program
    pub fn new(
        device: &mut dyn RenderDevice,
        compiler: &mut ShaderCompiler,
        provider: &dyn ShaderSourceProvider,
        faces: &[RgbaImage; 6],
    ) -> Result<Self> {
        let cubemap = device.create_colour_cube(faces)?;
        let mesh = match primitives::skybox_cube().upload(device) {
            Ok(mesh) => mesh,
            Err(err) => {
                device.delete_texture(cubemap);
                return Err(err);
            }
        };
        let program = match ShaderProgram::try_load(device, compiler, provider, SKYBOX_PROGRAM) {
            Ok(program) => program,
            Err(err) => {
                device.delete_mesh(mesh);
                device.delete_texture(cubemap);
                return Err(err);
            }
        };

        log::debug!("Skybox ready ({}x{} faces)", faces[0].width(), faces[0].height());
        Ok(Self { program, mesh, cubemap })
    }

    /// Load `<dir>/<face>.<extension>` for every face in [`FACE_NAMES`]
    pub fn load_faces(dir: impl AsRef<Path>, extension: &str) -> Result<[RgbaImage; 6]> {
        let dir = dir.as_ref();
        let load = |name: &str| -> Result<RgbaImage> {
            let path = dir.join(format!("{}.{}", name, extension));
            image::open(&path)
                .map(|image| image.to_rgba8())
                .map_err(|err| RenderError::Config(format!("skybox face {:?}: {}", path, err)))
        };
        Ok([
            load(FACE_NAMES[0])?,
            load(FACE_NAMES[1])?,
            load(FACE_NAMES[2])?,
            load(FACE_NAMES[3])?,
            load(FACE_NAMES[4])?,
            load(FACE_NAMES[5])?,
        ])
    }

    pub fn cubemap(&self) -> TextureId {
        self.cubemap
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Draw behind everything; returns the draw calls issued
    pub fn draw(
        &self,
        device: &mut dyn RenderDevice,
        view: Mat4,
        projection: Mat4,
        unit: u32,
    ) -> u32 {
        if !self.program.use_program(device) {
            return 0;
        }

        let saved = device.depth_state();
        device.set_depth_state(DepthState {
            test: true,
            func: DepthFunc::LessEqual,
            write: false,
        });

        self.program.set_view(device, rotation_only(view));
        self.program.set_projection(device, projection);
        self.program.set_skybox(device, unit);
        device.bind_texture(unit, Some(self.cubemap));
        device.draw_mesh(self.mesh);

        device.set_depth_state(saved);
        1
    }

    /// Delete the cube map, mesh and program
    pub fn release(mut self, device: &mut dyn RenderDevice) {
        device.delete_mesh(self.mesh);
        device.delete_texture(self.cubemap);
        self.program.release(device);
    }
}

/// Strip the translation from a view matrix
pub fn rotation_only(view: Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(view))
}
