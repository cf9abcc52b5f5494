//! Structured simplex mesh generators.
//!
//! Used to seed runs without an external mesh file and throughout the
//! tests. Triangles split each grid quad along its `v0–v2` diagonal;
//! tetrahedra use the six-tet Kuhn subdivision of each hexahedron, which is
//! conforming across neighboring cells.

use crate::loop_error::LoopError;
use crate::mesh::Mesh;

fn invalid_geometry(message: impl Into<String>) -> LoopError {
    LoopError::MeshVerification(message.into())
}

/// Generate a structured triangle mesh over `[min, max]` with `nx`×`ny` quads.
pub fn triangle_mesh(nx: usize, ny: usize, min: [f64; 2], max: [f64; 2]) -> Result<Mesh, LoopError> {
    if nx == 0 || ny == 0 {
        return Err(invalid_geometry("nx and ny must be positive"));
    }
    let dx = (max[0] - min[0]) / nx as f64;
    let dy = (max[1] - min[1]) / ny as f64;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        let y = min[1] + dy * j as f64;
        for i in 0..=nx {
            let x = min[0] + dx * i as f64;
            vertices.push([x, y, 0.0]);
        }
    }

    let row_stride = nx + 1;
    let mut cells = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v0 = j * row_stride + i;
            let v1 = v0 + 1;
            let v3 = v0 + row_stride;
            let v2 = v3 + 1;
            cells.push(vec![v0, v1, v2]);
            cells.push(vec![v0, v2, v3]);
        }
    }
    Mesh::from_parts(2, vertices, cells)
}

/// Generate a structured tetrahedral mesh over `[min, max]` with `nx`×`ny`×`nz` hexes.
pub fn tet_mesh(
    nx: usize,
    ny: usize,
    nz: usize,
    min: [f64; 3],
    max: [f64; 3],
) -> Result<Mesh, LoopError> {
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(invalid_geometry("nx, ny, and nz must be positive"));
    }
    let dx = (max[0] - min[0]) / nx as f64;
    let dy = (max[1] - min[1]) / ny as f64;
    let dz = (max[2] - min[2]) / nz as f64;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        let z = min[2] + dz * k as f64;
        for j in 0..=ny {
            let y = min[1] + dy * j as f64;
            for i in 0..=nx {
                let x = min[0] + dx * i as f64;
                vertices.push([x, y, z]);
            }
        }
    }

    let index = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
    // axis orders of the six paths from corner 000 to corner 111
    const PATHS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let mut cells = Vec::with_capacity(6 * nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for path in PATHS {
                    let mut corner = [i, j, k];
                    let mut tet = vec![index(corner[0], corner[1], corner[2])];
                    for axis in path {
                        corner[axis] += 1;
                        tet.push(index(corner[0], corner[1], corner[2]));
                    }
                    cells.push(tet);
                }
            }
        }
    }
    Mesh::from_parts(3, vertices, cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_counts() {
        let m = triangle_mesh(3, 2, [0.0, 0.0], [3.0, 2.0]).unwrap();
        assert_eq!(m.num_vertices(), 12);
        assert_eq!(m.num_elements(), 12);
        // only (1, 1) and (2, 1) are interior
        assert_eq!(m.boundary_vertices().len(), 10);
    }

    #[test]
    fn tet_counts() {
        let m = tet_mesh(2, 1, 1, [0.0; 3], [2.0, 1.0, 1.0]).unwrap();
        assert_eq!(m.num_vertices(), 12);
        assert_eq!(m.num_elements(), 12);
        // a 2x1x1 box has no interior grid vertex
        assert_eq!(m.boundary_vertices().len(), 12);
    }

    #[test]
    fn zero_cells_is_an_error() {
        assert!(triangle_mesh(0, 1, [0.0, 0.0], [1.0, 1.0]).is_err());
        assert!(tet_mesh(1, 0, 1, [0.0; 3], [1.0; 3]).is_err());
    }
}
