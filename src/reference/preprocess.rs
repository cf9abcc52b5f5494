use crate::algs::communicator::Communicator;
use crate::algs::field_transfer::geometry_payload;
use crate::config::AdaptConfig;
use crate::data::stream::FieldStream;
use crate::engines::Preprocessor;
use crate::io::checkpoint::write_mesh_file;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;
use std::path::PathBuf;

/// Packs the partition into the geometric restart stream.
///
/// Attached fields travel with the geometry when solution migration is on.
/// With `writeGeomBCFiles` set and a directory given, the partition is also
/// written to `geombc.{step}.rank{r}.json` there.
#[derive(Clone, Debug, Default)]
pub struct StreamPreprocessor {
    geombc_dir: Option<PathBuf>,
}

impl StreamPreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geombc_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            geombc_dir: Some(dir.into()),
        }
    }
}

impl<C: Communicator> Preprocessor<C> for StreamPreprocessor {
    fn preprocess(
        &mut self,
        mesh: &Mesh,
        config: &AdaptConfig,
        geom: &mut FieldStream,
        comm: &C,
    ) -> Result<(), LoopError> {
        if config.split_factor > 1 || config.tetrahedronize {
            rank0_info!(
                comm,
                "split factor {} / tetrahedronize {} ignored: partitions are simplicial and fixed",
                config.split_factor,
                config.tetrahedronize
            );
        }
        let step = config.time_step_number;
        geom.write(&geometry_payload(mesh, step, config.solution_migration)?)?;
        if config.write_geom_bc_files {
            if let Some(dir) = &self.geombc_dir {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("geombc.{step}.rank{}.json", comm.rank()));
                write_mesh_file(&path, mesh)?;
                log::debug!("wrote {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::field_transfer::mesh_from_geometry;
    use crate::data::stream::StreamKind;
    use crate::mesh_generation::triangle_mesh;

    #[test]
    fn fills_geometry_stream() {
        let mesh = triangle_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        StreamPreprocessor::new()
            .preprocess(&mesh, &AdaptConfig::default(), &mut geom, &NoComm)
            .unwrap();
        let payload = geom.open_for_read(StreamKind::GeomRestart).unwrap().decode().unwrap();
        assert_eq!(mesh_from_geometry(&payload).unwrap(), mesh);
    }

    #[test]
    fn geombc_file_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let mut pre = StreamPreprocessor::with_geombc_dir(dir.path());

        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        pre.preprocess(&mesh, &AdaptConfig::default(), &mut geom, &NoComm)
            .unwrap();
        assert!(dir.path().join("geombc.0.rank0.json").exists());

        let later = AdaptConfig::default().for_step(2);
        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        pre.preprocess(&mesh, &later, &mut geom, &NoComm).unwrap();
        assert!(!dir.path().join("geombc.2.rank0.json").exists());
    }

    #[test]
    fn refuses_to_overwrite_unread_geometry() {
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let mut geom = FieldStream::new(StreamKind::GeomRestart);
        let mut pre = StreamPreprocessor::new();
        pre.preprocess(&mesh, &AdaptConfig::default(), &mut geom, &NoComm)
            .unwrap();
        assert!(matches!(
            pre.preprocess(&mesh, &AdaptConfig::default(), &mut geom, &NoComm),
            Err(LoopError::StreamNotCleared { .. })
        ));
    }
}
