use proptest::prelude::*;
use remesh_loop::adapt::is_mesh_quality_good;
use remesh_loop::algs::communicator::{Communicator, ThreadComm};
use remesh_loop::data::field::{Association, Field, MESH_QUALITY_FIELD};
use remesh_loop::mesh::Mesh;
use remesh_loop::mesh_generation::triangle_mesh;

fn partition_with_quality(values: &[f64]) -> Mesh {
    // two triangles per quad
    let mut mesh = triangle_mesh(values.len() / 2, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
    mesh.attach_field(Field::scalar(
        MESH_QUALITY_FIELD,
        Association::Element,
        values.to_vec(),
    ))
    .unwrap();
    mesh
}

fn per_rank_quality() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..=4).prop_flat_map(|ranks| {
        prop::collection::vec(
            (1usize..=3).prop_flat_map(|quads| prop::collection::vec(0.0f64..1.0, quads * 2)),
            ranks,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn verdict_is_global_min_against_threshold(
        qualities in per_rank_quality(),
        threshold in 0.0f64..1.0,
    ) {
        let expected = qualities
            .iter()
            .flatten()
            .cloned()
            .fold(f64::INFINITY, f64::min)
            >= threshold;
        let verdicts = ThreadComm::run(qualities.len(), |comm| {
            let mesh = partition_with_quality(&qualities[comm.rank()]);
            is_mesh_quality_good(&mesh, threshold, &comm).unwrap()
        });
        prop_assert!(verdicts.iter().all(|&v| v == expected));
    }

    #[test]
    fn one_bad_element_anywhere_fails_everyone(
        ranks in 1usize..=4,
        bad_rank_seed in 0usize..16,
        bad_element in 0usize..4,
    ) {
        let bad_rank = bad_rank_seed % ranks;
        let verdicts = ThreadComm::run(ranks, |comm| {
            let mut q = vec![0.9; 4];
            if comm.rank() == bad_rank {
                q[bad_element] = 0.19;
            }
            is_mesh_quality_good(&partition_with_quality(&q), 0.2, &comm).unwrap()
        });
        prop_assert!(verdicts.iter().all(|&v| !v));
    }
}

#[test]
fn gate_without_quality_field_fails_on_every_rank() {
    let results = ThreadComm::run(2, |comm| {
        let mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        is_mesh_quality_good(&mesh, 0.2, &comm).is_err()
    });
    assert_eq!(results, vec![true, true]);
}
