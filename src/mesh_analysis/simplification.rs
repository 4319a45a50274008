use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::MeshError;
use crate::parser::obj::ObjParser;
use crate::structs_and_impls::Mesh;
use crate::writer::obj_writer::ObjWriter;

/// Tuning knobs for the in-process quadric decimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadricConfig {
    pub aggressiveness: f64,    // Exponent of the per-iteration error threshold
    pub max_iterations: usize,  // Hard cap on collapse passes
    pub preserve_border: bool,  // Never collapse edges that touch an open border
}

impl Default for QuadricConfig {
    fn default() -> Self {
        Self {
            aggressiveness: 7.0,
            max_iterations: 100,
            preserve_border: false,
        }
    }
}

fn default_program() -> String {
    "fq-mesh-simplify".to_string()
}

/// Where decimation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SimplifyBackend {
    /// Fast quadric mesh simplification, in process.
    Quadric(QuadricConfig),
    /// An external `<program> in.obj out.obj <fraction>` tool.
    External {
        #[serde(default = "default_program")]
        program: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl Default for SimplifyBackend {
    fn default() -> Self {
        SimplifyBackend::Quadric(QuadricConfig::default())
    }
}

impl Mesh {
    /// Simplify this mesh in place, keeping roughly `fraction` of its faces.
    ///
    /// Inputs too small to decimate (target of 4 faces or fewer) are left alone,
    /// as are `None` and `1.0`. Normals are recomputed afterwards.
    pub fn simplify(&mut self, fraction: Option<f64>, backend: &SimplifyBackend) -> Result<(), MeshError> {
        let Some(fraction) = fraction else {
            self.fill_missing_normals();
            return Ok(());
        };
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(MeshError::InvalidFraction(fraction));
        }
        if fraction == 1.0 || self.faces.len() as f64 * fraction <= 4.0 {
            self.fill_missing_normals();
            return Ok(());
        }

        let before = self.faces.len();
        match backend {
            SimplifyBackend::Quadric(config) => {
                let target = (before as f64 * fraction).round() as usize;
                let (vertices, faces) = QuadricSimplifier::new(&self.vertices_zyx, &self.faces).run(target, config);
                self.vertices_zyx = vertices;
                self.faces = faces;
            }
            SimplifyBackend::External { program, timeout_secs } => {
                let decimated = run_external(self, program, fraction, timeout_secs.map(Duration::from_secs))?;
                let (vertices, faces, _, _) = decimated.into_parts();
                self.vertices_zyx = vertices;
                self.faces = faces;
            }
        }
        self.drop_normals();

        // Decimation can leave degenerate faces behind
        self.recompute_normals(true);
        debug!("simplified {} faces to {} (fraction {})", before, self.faces.len(), fraction);
        Ok(())
    }

    fn fill_missing_normals(&mut self) {
        if !self.has_normals() {
            self.recompute_normals(true);
        }
    }
}

fn run_external(mesh: &Mesh, program: &str, fraction: f64, timeout: Option<Duration>) -> Result<Mesh, MeshError> {
    let program_path: PathBuf =
        which::which(program).map_err(|e| MeshError::Simplify(format!("cannot locate {}: {}", program, e)))?;

    let obj_dir = tempfile::tempdir()?;
    let undecimated_path = obj_dir.path().join("undecimated.obj");
    let decimated_path = obj_dir.path().join("decimated.obj");
    {
        let mut writer = BufWriter::new(File::create(&undecimated_path)?);
        // The tool ignores normals, so don't bother writing them
        ObjWriter::write_parts(&mesh.vertices_zyx, &mesh.faces, &[], &mut writer)?;
    }

    let mut command = Command::new(&program_path);
    command.arg(&undecimated_path).arg(&decimated_path).arg(fraction.to_string());
    let description = format!("{:?}", command);
    debug!("running {}", description);

    let mut child = command.spawn()?;
    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    // Best effort; the process may have exited in the meantime
                    let _ = child.kill();
                    let _ = child.wait();
                    let msg = format!("timed out after {:?}. Command was: {}", limit, description);
                    error!("{}", msg);
                    return Err(MeshError::Simplify(msg));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    };

    if !status.success() {
        let msg = format!("child process returned {}. Command was: {}", status, description);
        error!("{}", msg);
        return Err(MeshError::Simplify(msg));
    }

    Ok(ObjParser::parse_file(&decimated_path)?)
}

// ---------------------------------------------------------------------------
// Fast quadric mesh simplification (Garland-Heckbert quadrics with a rising
// error threshold instead of a priority queue).
// ---------------------------------------------------------------------------

type Vec3 = [f64; 3];

#[inline]
fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn unit(v: Vec3) -> Vec3 {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0; 3]
    }
}

/// Upper triangle of a symmetric 4x4 matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SymmetricMatrix([f64; 10]);

impl SymmetricMatrix {
    /// Quadric of the plane `ax + by + cz + d = 0`.
    fn plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        SymmetricMatrix([a * a, a * b, a * c, a * d, b * b, b * c, b * d, c * c, c * d, d * d])
    }

    #[allow(clippy::too_many_arguments)]
    fn det(&self, a11: usize, a12: usize, a13: usize, a21: usize, a22: usize, a23: usize, a31: usize, a32: usize, a33: usize) -> f64 {
        let m = &self.0;
        m[a11] * m[a22] * m[a33] + m[a13] * m[a21] * m[a32] + m[a12] * m[a23] * m[a31]
            - m[a13] * m[a22] * m[a31]
            - m[a11] * m[a23] * m[a32]
            - m[a12] * m[a21] * m[a33]
    }

    /// Error of placing a vertex at `p`.
    fn vertex_error(&self, p: Vec3) -> f64 {
        let q = &self.0;
        let [x, y, z] = p;
        q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }
}

impl std::ops::Add for SymmetricMatrix {
    type Output = SymmetricMatrix;

    fn add(self, rhs: SymmetricMatrix) -> SymmetricMatrix {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o += r;
        }
        SymmetricMatrix(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    err: [f64; 4],  // Per-edge collapse error, then their minimum
    deleted: bool,
    dirty: bool,
    n: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    p: Vec3,
    q: SymmetricMatrix,
    tstart: usize,
    tcount: usize,
    border: bool,
}

/// Triangle `tid` uses this vertex in slot `tvertex`.
#[derive(Debug, Clone, Copy, Default)]
struct Ref {
    tid: usize,
    tvertex: usize,
}

struct QuadricSimplifier {
    triangles: Vec<Triangle>,
    vertices: Vec<Vertex>,
    refs: Vec<Ref>,
}

impl QuadricSimplifier {
    fn new(vertices_zyx: &[[f32; 3]], faces: &[[u32; 3]]) -> Self {
        let vertices = vertices_zyx
            .iter()
            .map(|v| Vertex {
                p: v.map(f64::from),
                q: SymmetricMatrix::default(),
                tstart: 0,
                tcount: 0,
                border: false,
            })
            .collect();
        let triangles = faces
            .iter()
            .map(|f| Triangle {
                v: f.map(|i| i as usize),
                err: [0.0; 4],
                deleted: false,
                dirty: false,
                n: [0.0; 3],
            })
            .collect();
        Self {
            triangles,
            vertices,
            refs: Vec::new(),
        }
    }

    /// Collapse edges until at most `target_count` triangles remain (or we give up).
    fn run(mut self, target_count: usize, config: &QuadricConfig) -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
        let triangle_count = self.triangles.len();
        let mut deleted_triangles = 0usize;
        let mut deleted0: Vec<bool> = Vec::new();
        let mut deleted1: Vec<bool> = Vec::new();

        for iteration in 0..config.max_iterations {
            if triangle_count - deleted_triangles <= target_count {
                break;
            }

            // Refresh the mesh from time to time
            if iteration % 5 == 0 {
                self.update_mesh(iteration);
            }

            for t in &mut self.triangles {
                t.dirty = false;
            }

            // All triangles with edges below the threshold will be removed.
            // The threshold grows with each iteration.
            let threshold = 1e-9 * ((iteration + 3) as f64).powf(config.aggressiveness);

            for tid in 0..self.triangles.len() {
                let t = self.triangles[tid];
                if t.err[3] > threshold || t.deleted || t.dirty {
                    continue;
                }

                for j in 0..3 {
                    if t.err[j] >= threshold {
                        continue;
                    }
                    let i0 = t.v[j];
                    let i1 = t.v[(j + 1) % 3];
                    let v0 = self.vertices[i0];
                    let v1 = self.vertices[i1];

                    // Border check
                    if v0.border != v1.border || (config.preserve_border && v0.border) {
                        continue;
                    }

                    // Compute vertex to collapse to
                    let (_, p) = self.calculate_error(i0, i1);
                    deleted0.clear();
                    deleted0.resize(v0.tcount, false);
                    deleted1.clear();
                    deleted1.resize(v1.tcount, false);

                    // Don't remove if flipped
                    if self.flipped(p, i1, &v0, &mut deleted0) || self.flipped(p, i0, &v1, &mut deleted1) {
                        continue;
                    }

                    // Not flipped, so remove edge
                    self.vertices[i0].p = p;
                    self.vertices[i0].q = v1.q + v0.q;
                    let tstart = self.refs.len();

                    self.update_triangles(i0, &v0, &deleted0, &mut deleted_triangles);
                    self.update_triangles(i0, &v1, &deleted1, &mut deleted_triangles);

                    let tcount = self.refs.len() - tstart;
                    if tcount <= v0.tcount {
                        // Save memory: reuse the old slots
                        self.refs.copy_within(tstart..tstart + tcount, v0.tstart);
                    } else {
                        self.vertices[i0].tstart = tstart;
                    }
                    self.vertices[i0].tcount = tcount;
                    break;
                }

                // Done?
                if triangle_count - deleted_triangles <= target_count {
                    break;
                }
            }
        }

        self.compact_mesh()
    }

    /// Would collapsing into `p` flip (or squash) any triangle around `v0`?
    fn flipped(&self, p: Vec3, i1: usize, v0: &Vertex, deleted: &mut [bool]) -> bool {
        for k in 0..v0.tcount {
            let r = self.refs[v0.tstart + k];
            let t = &self.triangles[r.tid];
            if t.deleted {
                continue;
            }

            let id1 = t.v[(r.tvertex + 1) % 3];
            let id2 = t.v[(r.tvertex + 2) % 3];
            if id1 == i1 || id2 == i1 {
                // This triangle goes away with the edge
                deleted[k] = true;
                continue;
            }

            let d1 = unit(sub(self.vertices[id1].p, p));
            let d2 = unit(sub(self.vertices[id2].p, p));
            if dot(d1, d2).abs() > 0.999 {
                return true;
            }
            let n = unit(cross(d1, d2));
            deleted[k] = false;
            if dot(n, t.n) < 0.2 {
                return true;
            }
        }
        false
    }

    /// Point the surviving triangles of `v` at `i0` and update their errors.
    fn update_triangles(&mut self, i0: usize, v: &Vertex, deleted: &[bool], deleted_triangles: &mut usize) {
        for k in 0..v.tcount {
            let r = self.refs[v.tstart + k];
            if self.triangles[r.tid].deleted {
                continue;
            }
            if deleted[k] {
                self.triangles[r.tid].deleted = true;
                *deleted_triangles += 1;
                continue;
            }

            self.triangles[r.tid].v[r.tvertex] = i0;
            let tv = self.triangles[r.tid].v;
            let err = [
                self.calculate_error(tv[0], tv[1]).0,
                self.calculate_error(tv[1], tv[2]).0,
                self.calculate_error(tv[2], tv[0]).0,
            ];
            let t = &mut self.triangles[r.tid];
            t.dirty = true;
            t.err = [err[0], err[1], err[2], err[0].min(err[1]).min(err[2])];
            self.refs.push(r);
        }
    }

    /// Drop deleted triangles, rebuild the vertex -> triangle references, and
    /// on the first pass initialise borders, quadrics and edge errors.
    fn update_mesh(&mut self, iteration: usize) {
        if iteration > 0 {
            self.triangles.retain(|t| !t.deleted);
        }

        // Init reference ids
        for v in &mut self.vertices {
            v.tstart = 0;
            v.tcount = 0;
        }
        for t in &self.triangles {
            for &vid in &t.v {
                self.vertices[vid].tcount += 1;
            }
        }
        let mut tstart = 0;
        for v in &mut self.vertices {
            v.tstart = tstart;
            tstart += v.tcount;
            v.tcount = 0;
        }

        // Write references
        self.refs.clear();
        self.refs.resize(self.triangles.len() * 3, Ref::default());
        for (tid, t) in self.triangles.iter().enumerate() {
            for (tvertex, &vid) in t.v.iter().enumerate() {
                let v = &mut self.vertices[vid];
                self.refs[v.tstart + v.tcount] = Ref { tid, tvertex };
                v.tcount += 1;
            }
        }

        if iteration != 0 {
            return;
        }

        // Identify boundary vertices: a neighbour reached through only one triangle
        // means the edge between them is open
        let mut vcount: Vec<usize> = Vec::new();
        let mut vids: Vec<usize> = Vec::new();
        for i in 0..self.vertices.len() {
            vcount.clear();
            vids.clear();
            let v = self.vertices[i];
            for k in 0..v.tcount {
                let tid = self.refs[v.tstart + k].tid;
                for &id in &self.triangles[tid].v {
                    match vids.iter().position(|&x| x == id) {
                        Some(ofs) => vcount[ofs] += 1,
                        None => {
                            vcount.push(1);
                            vids.push(id);
                        }
                    }
                }
            }
            for (&count, &id) in vcount.iter().zip(&vids) {
                if count == 1 {
                    self.vertices[id].border = true;
                }
            }
        }

        // Init quadrics by plane and triangle normals
        for t in &mut self.triangles {
            let p0 = self.vertices[t.v[0]].p;
            let p1 = self.vertices[t.v[1]].p;
            let p2 = self.vertices[t.v[2]].p;
            let n = unit(cross(sub(p1, p0), sub(p2, p0)));
            t.n = n;
            let plane = SymmetricMatrix::plane(n[0], n[1], n[2], -dot(n, p0));
            for &vid in &t.v {
                self.vertices[vid].q = self.vertices[vid].q + plane;
            }
        }

        // Calc edge error
        for tid in 0..self.triangles.len() {
            let tv = self.triangles[tid].v;
            let err = [
                self.calculate_error(tv[0], tv[1]).0,
                self.calculate_error(tv[1], tv[2]).0,
                self.calculate_error(tv[2], tv[0]).0,
            ];
            self.triangles[tid].err = [err[0], err[1], err[2], err[0].min(err[1]).min(err[2])];
        }
    }

    /// Error of collapsing edge `(id_v1, id_v2)`, and the position to collapse to.
    fn calculate_error(&self, id_v1: usize, id_v2: usize) -> (f64, Vec3) {
        let v1 = &self.vertices[id_v1];
        let v2 = &self.vertices[id_v2];
        let q = v1.q + v2.q;
        let border = v1.border && v2.border;
        let det = q.det(0, 1, 2, 1, 4, 5, 2, 5, 7);

        if det != 0.0 && !border {
            // q_delta is invertible: the optimum lies at its solution
            let p = [
                -1.0 / det * q.det(1, 2, 3, 4, 5, 6, 5, 7, 8),
                1.0 / det * q.det(0, 2, 3, 1, 5, 6, 2, 7, 8),
                -1.0 / det * q.det(0, 1, 3, 1, 4, 6, 2, 5, 8),
            ];
            return (q.vertex_error(p), p);
        }

        // Otherwise pick the best of the endpoints and the midpoint
        let p1 = v1.p;
        let p2 = v2.p;
        let p3 = [(p1[0] + p2[0]) / 2.0, (p1[1] + p2[1]) / 2.0, (p1[2] + p2[2]) / 2.0];
        [p1, p2, p3]
            .into_iter()
            .map(|p| (q.vertex_error(p), p))
            .fold((f64::INFINITY, p3), |best, cand| if cand.0 < best.0 { cand } else { best })
    }

    /// Drop deleted triangles and unused vertices, returning the final buffers.
    fn compact_mesh(mut self) -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
        self.triangles.retain(|t| !t.deleted);

        let mut new_index = vec![usize::MAX; self.vertices.len()];
        for t in &self.triangles {
            for &vid in &t.v {
                new_index[vid] = 0;
            }
        }

        let mut vertices_zyx = Vec::new();
        for (vid, slot) in new_index.iter_mut().enumerate() {
            if *slot == 0 {
                *slot = vertices_zyx.len();
                vertices_zyx.push(self.vertices[vid].p.map(|c| c as f32));
            }
        }

        let faces = self
            .triangles
            .iter()
            .map(|t| t.v.map(|vid| new_index[vid] as u32))
            .collect();
        (vertices_zyx, faces)
    }
}
