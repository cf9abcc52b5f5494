use crate::config::AdaptConfig;
use crate::engines::CoordinateUpdate;
use crate::loop_error::LoopError;
use crate::mesh::Mesh;

/// Rigid x-velocity of case 1, per step.
pub const TRANSLATION_PER_STEP: f64 = 0.01;
/// Scaling rate of case 2, per step.
pub const SCALING_PER_STEP: f64 = 0.01;

/// Prescribed boundary motion by case id.
///
/// - `0`: static.
/// - `1`: rigid translation along x.
/// - `2`: uniform scaling about the origin.
///
/// Motion is applied for the steps elapsed since the previous call.
/// Unknown ids leave the coordinates unchanged.
#[derive(Clone, Debug, Default)]
pub struct MotionCase {
    last_step: u32,
}

impl CoordinateUpdate for MotionCase {
    fn update_coordinates(
        &mut self,
        _config: &AdaptConfig,
        mesh: &mut Mesh,
        step: u32,
        case_id: i32,
    ) -> Result<(), LoopError> {
        let elapsed = step.saturating_sub(self.last_step) as f64;
        self.last_step = step;
        match case_id {
            0 => {}
            1 => {
                for c in mesh.coords_mut() {
                    c[0] += TRANSLATION_PER_STEP * elapsed;
                }
            }
            2 => {
                let factor = (1.0 + SCALING_PER_STEP).powf(elapsed);
                for c in mesh.coords_mut() {
                    for x in c.iter_mut() {
                        *x *= factor;
                    }
                }
            }
            other => log::warn!("unknown motion case {other}; coordinates unchanged"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::triangle_mesh;

    fn apply(case: i32, steps: &[u32]) -> Mesh {
        let mut mesh = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let mut motion = MotionCase::default();
        for &s in steps {
            motion
                .update_coordinates(&AdaptConfig::default(), &mut mesh, s, case)
                .unwrap();
        }
        mesh
    }

    #[test]
    fn translation_accumulates_by_elapsed_steps() {
        let mesh = apply(1, &[2, 5]);
        assert!((mesh.coords()[0][0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn scaling_is_about_the_origin() {
        let mesh = apply(2, &[1]);
        assert_eq!(mesh.coords()[0], [0.0, 0.0, 0.0]);
        assert!((mesh.coords()[3][1] - 1.01).abs() < 1e-12);
    }

    #[test]
    fn static_and_unknown_cases_do_nothing() {
        let original = triangle_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap();
        assert_eq!(apply(0, &[3]), original);
        assert_eq!(apply(42, &[3]), original);
    }
}
