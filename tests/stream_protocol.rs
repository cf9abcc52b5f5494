use remesh_loop::data::field::{Association, Field};
use remesh_loop::data::stream::{FieldStream, StreamKind, StreamPayload, StreamState};
use remesh_loop::loop_error::{ErrorClass, LoopError};
use std::io::Read;

fn payload(step: u32) -> StreamPayload {
    StreamPayload::new(
        step,
        vec![Field::scalar("p", Association::Vertex, vec![step as f64; 3])],
    )
}

#[test]
fn cleared_stream_rejects_reads_until_written_again() {
    let mut rs = FieldStream::new(StreamKind::Restart);
    rs.write(&payload(1)).unwrap();
    rs.open_for_read(StreamKind::Restart).unwrap();
    rs.clear();
    assert_eq!(rs.state(), StreamState::Empty);

    let err = rs.open_for_read(StreamKind::Restart).unwrap_err();
    assert_eq!(
        err,
        LoopError::EmptyStream {
            kind: StreamKind::Restart,
            state: StreamState::Empty
        }
    );

    rs.write(&payload(2)).unwrap();
    let back = rs.open_for_read(StreamKind::Restart).unwrap().decode().unwrap();
    assert_eq!(back, payload(2));
}

#[test]
fn consumed_stream_cannot_be_read_twice_or_rewritten() {
    let mut grs = FieldStream::new(StreamKind::GeomRestart);
    grs.write(&payload(0)).unwrap();
    grs.open_for_read(StreamKind::GeomRestart).unwrap();
    assert_eq!(grs.state(), StreamState::Consumed);
    assert!(matches!(
        grs.open_for_read(StreamKind::GeomRestart),
        Err(LoopError::EmptyStream { .. })
    ));
    assert!(matches!(
        grs.write(&payload(1)),
        Err(LoopError::StreamNotCleared { .. })
    ));
}

#[test]
fn second_unconsumed_write_is_rejected() {
    let mut rs = FieldStream::new(StreamKind::Restart);
    rs.write(&payload(1)).unwrap();
    let err = rs.write(&payload(2)).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Protocol);
    // the first payload survives
    assert_eq!(
        rs.open_for_read(StreamKind::Restart).unwrap().decode().unwrap().step,
        1
    );
}

#[test]
fn streams_are_never_cross_consumed() {
    let mut rs = FieldStream::new(StreamKind::Restart);
    let mut grs = FieldStream::new(StreamKind::GeomRestart);
    rs.write(&payload(1)).unwrap();
    grs.write(&payload(2)).unwrap();
    assert!(matches!(
        rs.open_for_read(StreamKind::GeomRestart),
        Err(LoopError::StreamKindMismatch { .. })
    ));
    // a failed open leaves the payload in place
    assert!(rs.has_payload());
    assert_eq!(grs.open_named("geombc.dat.1").unwrap().decode().unwrap().step, 2);
    assert_eq!(rs.open_named("restart.1.1").unwrap().decode().unwrap().step, 1);
}

#[test]
fn unknown_stream_name_is_protocol_error() {
    let mut rs = FieldStream::new(StreamKind::Restart);
    rs.write(&payload(1)).unwrap();
    let err = rs.open_named("solution.vtk").unwrap_err();
    assert_eq!(err, LoopError::UnknownStreamKind("solution.vtk".into()));
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[test]
fn reader_exposes_raw_bytes() {
    let mut rs = FieldStream::new(StreamKind::Restart);
    rs.write(&payload(7)).unwrap();
    let mut reader = rs.open_for_read(StreamKind::Restart).unwrap();
    let total = reader.remaining();
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).unwrap();
    assert_eq!(raw.len(), total);
    assert_eq!(StreamPayload::decode(&raw).unwrap(), payload(7));
}
