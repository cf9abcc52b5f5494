use crate::algs::communicator::Communicator;
use crate::config::AdaptConfig;
use crate::engines::MeshSource;
use crate::io::checkpoint::read_mesh_file;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;
use crate::mesh_generation::triangle_mesh;
use std::path::{Path, PathBuf};

/// Loads the partition named by `meshFileName` from a directory.
///
/// A single worker reads the file itself; worker `r` of a larger group
/// reads `<stem>.rank<r>.json`.
#[derive(Clone, Debug)]
pub struct FileMeshSource {
    dir: PathBuf,
}

impl FileMeshSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the piece for `rank` of `size` workers.
    pub fn piece_path(&self, file_name: &str, rank: usize, size: usize) -> PathBuf {
        let base = self.dir.join(file_name);
        if size == 1 {
            base
        } else {
            base.with_extension(format!("rank{rank}.json"))
        }
    }
}

impl<C: Communicator> MeshSource<C> for FileMeshSource {
    fn load(&mut self, config: &AdaptConfig, comm: &C) -> Result<Mesh, LoopError> {
        let path = self.piece_path(&config.mesh_file_name, comm.rank(), comm.size());
        let mesh = read_mesh_file(&path)?;
        rank0_info!(
            comm,
            "loaded {} ({} vertices, {} elements)",
            path.display(),
            mesh.num_vertices(),
            mesh.num_elements()
        );
        Ok(mesh)
    }
}

/// Generates a unit-square triangle grid per worker, shifted along x by rank.
#[derive(Clone, Copy, Debug)]
pub struct GridMeshSource {
    pub cells: usize,
}

impl<C: Communicator> MeshSource<C> for GridMeshSource {
    fn load(&mut self, _config: &AdaptConfig, comm: &C) -> Result<Mesh, LoopError> {
        let x0 = comm.rank() as f64;
        let mesh = triangle_mesh(self.cells, self.cells, [x0, 0.0], [x0 + 1.0, 1.0])?;
        rank0_info!(comm, "generated {0}x{0} grid per rank", self.cells);
        Ok(mesh)
    }
}

/// Hands out a mesh built in memory; loading twice is an error.
#[derive(Clone, Debug)]
pub struct GivenMesh(Option<Mesh>);

impl GivenMesh {
    pub fn new(mesh: Mesh) -> Self {
        Self(Some(mesh))
    }
}

impl<C: Communicator> MeshSource<C> for GivenMesh {
    fn load(&mut self, _config: &AdaptConfig, _comm: &C) -> Result<Mesh, LoopError> {
        self.0
            .take()
            .ok_or_else(|| LoopError::MeshVerification("mesh already handed out".into()))
    }
}

/// True if the piece this worker would load exists.
pub fn mesh_file_exists(dir: &Path, file_name: &str, rank: usize, size: usize) -> bool {
    FileMeshSource::new(dir)
        .piece_path(file_name, rank, size)
        .exists()
}
