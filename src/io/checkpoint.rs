//! Checkpoint writer: sequence snapshots and phase records.
//!
//! Layout under the checkpoint directory:
//!
//! ```text
//! {prefix}{seq}/rank{r}.mesh.json     one mesh piece per rank
//! {prefix}{seq}/rank{r}.meta.json     piece metadata
//! phase{phase}.pht.json               phase record, rank 0 only
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! writing the same sequence number twice replaces the snapshot rather than
//! leaving a mix of old and new pieces.

use crate::algs::communicator::Communicator;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_METADATA_VERSION: u32 = 1;

/// Metadata written beside each rank's mesh piece.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceMetadata {
    /// Metadata format version.
    pub version: u32,
    /// Sequence index of the snapshot.
    pub sequence: u32,
    /// Rank that owns this piece.
    pub rank: usize,
    /// Total number of ranks in the communicator.
    pub size: usize,
    pub num_vertices: usize,
    pub num_elements: usize,
    /// Names of the fields carried by the piece.
    pub fields: Vec<String>,
}

/// Phase record written by rank 0 before each adaptation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub version: u32,
    /// Step at which the phase starts.
    pub start_step: u32,
    /// Steps elapsed since the previous phase record.
    pub elapsed_steps: u32,
    /// Number of workers in the run.
    pub num_ranks: usize,
}

/// Writes checkpoints under one directory with one sequence prefix.
#[derive(Clone, Debug)]
pub struct CheckpointWriter {
    dir: PathBuf,
    prefix: String,
}

impl CheckpointWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory of sequence snapshot `seq`.
    pub fn sequence_dir(&self, seq: u32) -> PathBuf {
        self.dir.join(format!("{}{seq}", self.prefix))
    }

    /// Path of rank `rank`'s mesh piece in snapshot `seq`.
    pub fn piece_path(&self, seq: u32, rank: usize) -> PathBuf {
        self.sequence_dir(seq).join(format!("rank{rank}.mesh.json"))
    }

    /// Path of rank `rank`'s piece metadata in snapshot `seq`.
    pub fn meta_path(&self, seq: u32, rank: usize) -> PathBuf {
        self.sequence_dir(seq).join(format!("rank{rank}.meta.json"))
    }

    /// Path of the phase record for `phase`.
    pub fn phase_path(&self, phase: u32) -> PathBuf {
        self.dir.join(format!("phase{phase}.pht.json"))
    }

    /// Collective: every rank writes its piece of snapshot `seq`.
    ///
    /// Ends with a barrier so no rank reads a snapshot before all pieces
    /// are in place.
    pub fn write_sequence<C: Communicator>(
        &self,
        mesh: &Mesh,
        seq: u32,
        comm: &C,
    ) -> Result<PieceMetadata, LoopError> {
        let rank = comm.rank();
        let seq_dir = self.sequence_dir(seq);
        fs::create_dir_all(&seq_dir)?;

        let mesh_bytes =
            serde_json::to_vec(mesh).map_err(|e| LoopError::Checkpoint(e.to_string()))?;
        write_atomic(&self.piece_path(seq, rank), &mesh_bytes)?;

        let metadata = PieceMetadata {
            version: CHECKPOINT_METADATA_VERSION,
            sequence: seq,
            rank,
            size: comm.size(),
            num_vertices: mesh.num_vertices(),
            num_elements: mesh.num_elements(),
            fields: mesh.field_names().map(str::to_string).collect(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| LoopError::Checkpoint(e.to_string()))?;
        write_atomic(&self.meta_path(seq, rank), &meta_bytes)?;

        comm.barrier()?;
        rank0_info!(comm, "wrote checkpoint {}", seq_dir.display());
        Ok(metadata)
    }

    /// Collective: rank 0 records a phase starting at `phase` after
    /// `elapsed_steps` steps on `num_ranks` workers.
    ///
    /// Returns the record on every rank.
    pub fn write_phase<C: Communicator>(
        &self,
        phase: u32,
        elapsed_steps: u32,
        num_ranks: usize,
        comm: &C,
    ) -> Result<PhaseRecord, LoopError> {
        let record = PhaseRecord {
            version: CHECKPOINT_METADATA_VERSION,
            start_step: phase,
            elapsed_steps,
            num_ranks,
        };
        if comm.rank() == 0 {
            fs::create_dir_all(&self.dir)?;
            let bytes = serde_json::to_vec_pretty(&record)
                .map_err(|e| LoopError::Checkpoint(e.to_string()))?;
            write_atomic(&self.phase_path(phase), &bytes)?;
            log::info!(
                "phase {phase}: {elapsed_steps} steps elapsed on {num_ranks} ranks"
            );
        }
        comm.barrier()?;
        Ok(record)
    }

    /// Read back rank `rank`'s piece of snapshot `seq`.
    pub fn read_sequence_piece(&self, seq: u32, rank: usize) -> Result<Mesh, LoopError> {
        read_mesh_file(self.piece_path(seq, rank))
    }

    /// Read back rank `rank`'s piece metadata of snapshot `seq`.
    pub fn read_piece_metadata(&self, seq: u32, rank: usize) -> Result<PieceMetadata, LoopError> {
        let bytes = fs::read(self.meta_path(seq, rank))?;
        serde_json::from_slice(&bytes).map_err(|e| LoopError::Checkpoint(e.to_string()))
    }

    /// Read back the phase record for `phase`.
    pub fn read_phase(&self, phase: u32) -> Result<PhaseRecord, LoopError> {
        let bytes = fs::read(self.phase_path(phase))?;
        serde_json::from_slice(&bytes).map_err(|e| LoopError::Checkpoint(e.to_string()))
    }
}

/// Load a mesh from a JSON mesh file and verify it.
pub fn read_mesh_file(path: impl AsRef<Path>) -> Result<Mesh, LoopError> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| LoopError::Io(format!("{}: {e}", path.display())))?;
    let mesh: Mesh = serde_json::from_slice(&bytes)
        .map_err(|e| LoopError::Checkpoint(format!("{}: {e}", path.display())))?;
    mesh.verify()?;
    Ok(mesh)
}

/// Write a mesh to a JSON mesh file.
pub fn write_mesh_file(path: impl AsRef<Path>, mesh: &Mesh) -> Result<(), LoopError> {
    let bytes = serde_json::to_vec(mesh).map_err(|e| LoopError::Checkpoint(e.to_string()))?;
    write_atomic(path.as_ref(), &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LoopError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use crate::data::field::{Association, Field};
    use crate::mesh_generation::triangle_mesh;

    #[test]
    fn sequence_roundtrip_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(dir.path(), "test_");
        let mut mesh = triangle_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap();
        mesh.attach_field(Field::scalar("u", Association::Vertex, vec![0.5; 9]))
            .unwrap();

        let meta = writer.write_sequence(&mesh, 0, &NoComm).unwrap();
        assert_eq!(meta.fields, vec!["u".to_string()]);
        assert!(dir.path().join("test_0").join("rank0.mesh.json").exists());
        assert_eq!(writer.read_sequence_piece(0, 0).unwrap(), mesh);
        assert_eq!(writer.read_piece_metadata(0, 0).unwrap(), meta);
    }

    #[test]
    fn repeated_sequence_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(dir.path(), "test_");
        let first = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let second = triangle_mesh(2, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        writer.write_sequence(&first, 3, &NoComm).unwrap();
        writer.write_sequence(&second, 3, &NoComm).unwrap();
        assert_eq!(writer.read_sequence_piece(3, 0).unwrap(), second);
        let leftovers: Vec<_> = fs::read_dir(writer.sequence_dir(3))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn phase_written_by_rank_zero_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let records = ThreadComm::run(3, move |comm| {
            let writer = CheckpointWriter::new(&path, "test_");
            writer.write_phase(4, 3, comm.size(), &comm).unwrap()
        });
        assert!(records.iter().all(|r| r.start_step == 4 && r.elapsed_steps == 3));
        let writer = CheckpointWriter::new(dir.path(), "test_");
        let back = writer.read_phase(4).unwrap();
        assert_eq!(back.num_ranks, 3);
        let phase_files = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("phase"))
            .count();
        assert_eq!(phase_files, 1);
    }

    #[test]
    fn each_rank_writes_its_own_piece() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        ThreadComm::run(2, move |comm| {
            let x0 = comm.rank() as f64;
            let mesh = triangle_mesh(1, 1, [x0, 0.0], [x0 + 1.0, 1.0]).unwrap();
            CheckpointWriter::new(&path, "seq_")
                .write_sequence(&mesh, 1, &comm)
                .unwrap();
        });
        let writer = CheckpointWriter::new(dir.path(), "seq_");
        assert_eq!(writer.read_sequence_piece(1, 1).unwrap().coords()[0][0], 1.0);
        assert_eq!(writer.read_piece_metadata(1, 0).unwrap().size, 2);
    }

    #[test]
    fn corrupt_mesh_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read_mesh_file(&path), Err(LoopError::Checkpoint(_))));
    }
}
