use std::collections::HashMap;

use glam::{IVec2, UVec2, Vec2};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self { min: self.min - Vec2::splat(margin), max: self.max + Vec2::splat(margin) }
    }

    pub fn translated(&self, offset: Vec2) -> Self {
        Self { min: self.min + offset, max: self.max + offset }
    }

    pub fn extent(&self) -> Vec2 {
        self.max - self.min
    }
}

/// Triangulated 2D body outline.
#[derive(Clone, Debug, Default)]
pub struct TriangleMesh2D {
    pub vertices: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

#[derive(Clone, Copy, Debug)]
struct BoundaryEdge {
    a: Vec2,
    b: Vec2,
    outward: Vec2,
}

/// Uniform grid over the mesh bounds; each cell lists the items whose bounds overlap it.
#[derive(Clone, Debug)]
struct CellBuckets {
    origin: Vec2,
    cell: f32,
    dims: UVec2,
    items: Vec<Vec<u32>>,
}

impl CellBuckets {
    const MAX_CELLS_PER_AXIS: u32 = 256;

    fn new(aabb: Aabb, item_count: usize) -> Self {
        let extent = aabb.extent().max(Vec2::splat(f32::EPSILON));
        // about one item per cell
        let cell = (extent.x * extent.y / item_count.max(1) as f32)
            .sqrt()
            .max(extent.max_element() / Self::MAX_CELLS_PER_AXIS as f32);
        let dims = (extent / cell).ceil().as_uvec2().max(UVec2::ONE);
        Self { origin: aabb.min, cell, dims, items: vec![Vec::new(); (dims.x * dims.y) as usize] }
    }

    fn cell_of(&self, p: Vec2) -> IVec2 {
        ((p - self.origin) / self.cell).floor().as_ivec2()
    }

    fn clamped(&self, c: IVec2) -> IVec2 {
        c.clamp(IVec2::ZERO, self.dims.as_ivec2() - IVec2::ONE)
    }

    fn index(&self, c: IVec2) -> Option<usize> {
        let inside = c.cmpge(IVec2::ZERO).all() && c.cmplt(self.dims.as_ivec2()).all();
        inside.then(|| (c.y as u32 * self.dims.x + c.x as u32) as usize)
    }

    fn insert(&mut self, item: u32, min: Vec2, max: Vec2) {
        let lo = self.clamped(self.cell_of(min));
        let hi = self.clamped(self.cell_of(max));
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                if let Some(i) = self.index(IVec2::new(x, y)) {
                    self.items[i].push(item);
                }
            }
        }
    }

    fn at(&self, c: IVec2) -> &[u32] {
        match self.index(c) {
            Some(i) => &self.items[i],
            None => &[],
        }
    }

    /// Cells at Chebyshev distance `ring` from `center`.
    fn ring(center: IVec2, ring: i32) -> impl Iterator<Item = IVec2> {
        (-ring..=ring).flat_map(move |dy| {
            (-ring..=ring)
                .filter(move |dx| ring == 0 || dy.abs() == ring || dx.abs() == ring)
                .map(move |dx| center + IVec2::new(dx, dy))
        })
    }
}

/// Closest-point queries against a mesh, built once per body.
///
/// Only edges owned by a single triangle are kept; the sign comes from a
/// triangle containment test. Both edges and triangles are bucketed in a
/// uniform grid so a query only visits nearby cells.
#[derive(Clone, Debug)]
pub struct MeshDistance {
    mesh: TriangleMesh2D,
    edges: Vec<BoundaryEdge>,
    aabb: Aabb,
    edge_cells: CellBuckets,
    triangle_cells: CellBuckets,
}

impl MeshDistance {
    pub fn new(mesh: TriangleMesh2D) -> Self {
        let mut owners: HashMap<(u32, u32), (usize, u32)> = HashMap::new();
        for (t, tri) in mesh.triangles.iter().enumerate() {
            for k in 0..3 {
                let (i, j) = (tri[k], tri[(k + 1) % 3]);
                let key = (i.min(j), i.max(j));
                owners.entry(key).or_insert((t, 0)).1 += 1;
            }
        }

        let mut edges: Vec<BoundaryEdge> = owners
            .into_iter()
            .filter(|(_, (_, count))| *count == 1)
            .map(|((i, j), (t, _))| {
                let a = mesh.vertices[i as usize];
                let b = mesh.vertices[j as usize];
                let centroid = triangle_points(&mesh, t).iter().copied().sum::<Vec2>() / 3.0;
                let mut outward = (b - a).perp().normalize_or_zero();
                if outward.dot((a + b) * 0.5 - centroid) < 0.0 {
                    outward = -outward;
                }
                BoundaryEdge { a, b, outward }
            })
            .collect();
        // HashMap iteration order is random; keep queries reproducible
        edges.sort_by(|e, f| {
            (e.a.x, e.a.y, e.b.x, e.b.y)
                .partial_cmp(&(f.a.x, f.a.y, f.b.x, f.b.y))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (min, max) = mesh.vertices.iter().fold(
            (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN)),
            |(lo, hi), v| (lo.min(*v), hi.max(*v)),
        );
        let aabb = Aabb::new(min, max);

        let mut edge_cells = CellBuckets::new(aabb, edges.len());
        for (i, e) in edges.iter().enumerate() {
            edge_cells.insert(i as u32, e.a.min(e.b), e.a.max(e.b));
        }
        let mut triangle_cells = CellBuckets::new(aabb, mesh.triangles.len());
        for t in 0..mesh.triangles.len() {
            let [a, b, c] = triangle_points(&mesh, t);
            triangle_cells.insert(t as u32, a.min(b).min(c), a.max(b).max(c));
        }

        Self { mesh, edges, aabb, edge_cells, triangle_cells }
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn contains(&self, p: Vec2) -> bool {
        let cell = self.triangle_cells.clamped(self.triangle_cells.cell_of(p));
        self.triangle_cells.at(cell).iter().any(|&t| {
            let [a, b, c] = triangle_points(&self.mesh, t as usize);
            let d1 = (b - a).perp_dot(p - a);
            let d2 = (c - b).perp_dot(p - b);
            let d3 = (a - c).perp_dot(p - c);
            let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
            let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
            !(has_neg && has_pos)
        })
    }

    /// Signed distance (negative inside) and outward unit normal.
    pub fn signed_distance(&self, p: Vec2) -> (f32, Vec2) {
        if self.edges.is_empty() {
            return (f32::MAX, Vec2::Y);
        }
        let (dist, closest, edge_normal) = self.closest_edge(p);
        // on the surface the direction to the closest point is undefined
        if dist < 1.0e-6 {
            return (0.0, edge_normal);
        }
        if self.contains(p) {
            (-dist, (closest - p) / dist)
        } else {
            (dist, (p - closest) / dist)
        }
    }
}

impl MeshDistance {
    /// Distance, closest point and normal of the nearest boundary edge; ties go
    /// to the lower edge index.
    fn closest_edge(&self, p: Vec2) -> (f32, Vec2, Vec2) {
        let grid = &self.edge_cells;
        let center = grid.clamped(grid.cell_of(p));
        let rings = grid.dims.max_element() as i32;
        let mut best = (f32::MAX, u32::MAX, Vec2::ZERO, Vec2::Y);
        for ring in 0..=rings {
            for cell in CellBuckets::ring(center, ring) {
                for &i in grid.at(cell) {
                    let e = &self.edges[i as usize];
                    let ab = e.b - e.a;
                    let t = ((p - e.a).dot(ab) / ab.length_squared().max(f32::EPSILON)).clamp(0.0, 1.0);
                    let closest = e.a + ab * t;
                    let dist = p.distance(closest);
                    if dist < best.0 || (dist == best.0 && i < best.1) {
                        best = (dist, i, closest, e.outward);
                    }
                }
            }
            // cells further out are at least `ring * cell` away
            if best.0 < ring as f32 * grid.cell {
                break;
            }
        }
        (best.0, best.2, best.3)
    }
}

fn triangle_points(mesh: &TriangleMesh2D, t: usize) -> [Vec2; 3] {
    let tri = mesh.triangles[t];
    tri.map(|i| mesh.vertices[i as usize])
}

#[derive(Clone, Debug)]
pub enum Shape {
    /// Half-space `dot(p, normal) + offset < 0`, bounded by the domain.
    Plane { normal: Vec2, offset: f32 },
    Box { half_size: Vec2 },
    Mesh(MeshDistance),
}

#[derive(Clone, Debug)]
pub struct RigidBody {
    pub shape: Shape,
    pub position: Vec2,
    /// Flip inside and outside, turning a box into a container.
    pub invert: bool,
    pub enabled: bool,
}

impl RigidBody {
    pub fn new(shape: Shape, position: Vec2) -> Self {
        Self { shape, position, invert: false, enabled: true }
    }

    pub fn floor(height: f32) -> Self {
        Self::new(Shape::Plane { normal: Vec2::Y, offset: -height }, Vec2::ZERO)
    }

    pub fn wall(normal: Vec2, offset: f32) -> Self {
        Self::new(Shape::Plane { normal: normal.normalize(), offset }, Vec2::ZERO)
    }

    pub fn cuboid(center: Vec2, half_size: Vec2) -> Self {
        Self::new(Shape::Box { half_size }, center)
    }

    pub fn container(center: Vec2, half_size: Vec2) -> Self {
        Self { invert: true, ..Self::cuboid(center, half_size) }
    }

    pub fn mesh(mesh: TriangleMesh2D, position: Vec2) -> Self {
        Self::new(Shape::Mesh(MeshDistance::new(mesh)), position)
    }

    pub fn disabled(self) -> Self {
        Self { enabled: false, ..self }
    }

    /// Signed distance in world space (negative inside) and outward normal.
    pub fn signed_distance(&self, world: Vec2) -> (f32, Vec2) {
        let p = world - self.position;
        let (d, n) = match &self.shape {
            Shape::Plane { normal, offset } => (p.dot(*normal) + offset, *normal),
            Shape::Box { half_size } => box_distance(p, *half_size),
            Shape::Mesh(mesh) => mesh.signed_distance(p),
        };
        if self.invert { (-d, -n) } else { (d, n) }
    }

    /// World-space bounds the volume map has to cover, before the kernel margin.
    pub fn bounds(&self, domain: Aabb) -> Aabb {
        match &self.shape {
            Shape::Plane { .. } => domain,
            Shape::Box { half_size } => Aabb::new(-*half_size, *half_size).translated(self.position),
            Shape::Mesh(mesh) => mesh.aabb().translated(self.position),
        }
    }
}

fn box_distance(p: Vec2, half_size: Vec2) -> (f32, Vec2) {
    let q = p.abs() - half_size;
    let outside = q.max(Vec2::ZERO);
    let d = outside.length() + q.x.max(q.y).min(0.0);
    let sign = Vec2::new(sign_or_one(p.x), sign_or_one(p.y));
    let n = if q.x > 0.0 || q.y > 0.0 {
        (outside * sign).normalize_or_zero()
    } else if q.x > q.y {
        Vec2::new(sign.x, 0.0)
    } else {
        Vec2::new(0.0, sign.y)
    };
    (d, n)
}

fn sign_or_one(v: f32) -> f32 {
    if v < 0.0 { -1.0 } else { 1.0 }
}
