//! Barnes–Hut quadtree over the layout plane (x, z). Internal cells carry
//! centers of mass so far-away clusters collapse into a single repulsion
//! term under the theta criterion.

const MAX_DEPTH: usize = 24;

struct Cell {
    // Square region
    cx: f32,
    cz: f32,
    half: f32,
    mass: f32,
    com_x: f32,
    com_z: f32,
    children: Option<[usize; 4]>,
    point: Option<usize>,
}

pub struct QuadTree {
    cells: Vec<Cell>,
    points: Vec<(f32, f32)>,
}

impl QuadTree {
    pub fn build(points: &[(f32, f32)]) -> Self {
        let (mut min_x, mut max_x, mut min_z, mut max_z) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
        for (x, z) in points {
            min_x = min_x.min(*x);
            max_x = max_x.max(*x);
            min_z = min_z.min(*z);
            max_z = max_z.max(*z);
        }
        if points.is_empty() {
            min_x = -1.0;
            max_x = 1.0;
            min_z = -1.0;
            max_z = 1.0;
        }
        let half = ((max_x - min_x).max(max_z - min_z) / 2.0).max(0.5) * 1.01;
        let root = Cell {
            cx: (min_x + max_x) / 2.0,
            cz: (min_z + max_z) / 2.0,
            half,
            mass: 0.0,
            com_x: 0.0,
            com_z: 0.0,
            children: None,
            point: None,
        };
        let mut tree = Self {
            cells: vec![root],
            points: points.to_vec(),
        };
        for i in 0..points.len() {
            tree.insert(0, i, 0);
        }
        tree.aggregate(0);
        tree
    }

    fn quadrant(cell: &Cell, x: f32, z: f32) -> usize {
        let mut q = 0;
        if x >= cell.cx {
            q += 1;
        }
        if z >= cell.cz {
            q += 2;
        }
        q
    }

    fn split(&mut self, cell_idx: usize) {
        let (cx, cz, half) = {
            let c = &self.cells[cell_idx];
            (c.cx, c.cz, c.half / 2.0)
        };
        let mut children = [0usize; 4];
        for (q, child) in children.iter_mut().enumerate() {
            let dx = if q & 1 == 1 { half } else { -half };
            let dz = if q & 2 == 2 { half } else { -half };
            *child = self.cells.len();
            self.cells.push(Cell {
                cx: cx + dx,
                cz: cz + dz,
                half,
                mass: 0.0,
                com_x: 0.0,
                com_z: 0.0,
                children: None,
                point: None,
            });
        }
        self.cells[cell_idx].children = Some(children);
    }

    fn insert(&mut self, cell_idx: usize, point_idx: usize, depth: usize) {
        let (px, pz) = self.points[point_idx];
        if self.cells[cell_idx].children.is_none() {
            match self.cells[cell_idx].point {
                None => {
                    self.cells[cell_idx].point = Some(point_idx);
                    return;
                }
                Some(existing) => {
                    // Coincident points beyond the depth cap pile into the
                    // leaf; their repulsion is handled by the caller's jitter.
                    if depth >= MAX_DEPTH {
                        return;
                    }
                    self.cells[cell_idx].point = None;
                    self.split(cell_idx);
                    let (ex, ez) = self.points[existing];
                    let q = Self::quadrant(&self.cells[cell_idx], ex, ez);
                    let child = self.cells[cell_idx].children.unwrap()[q];
                    self.insert(child, existing, depth + 1);
                }
            }
        }
        let q = Self::quadrant(&self.cells[cell_idx], px, pz);
        let child = self.cells[cell_idx].children.unwrap()[q];
        self.insert(child, point_idx, depth + 1);
    }

    fn aggregate(&mut self, cell_idx: usize) -> (f32, f32, f32) {
        let children = self.cells[cell_idx].children;
        let (mass, com_x, com_z) = match children {
            None => match self.cells[cell_idx].point {
                Some(p) => {
                    let (x, z) = self.points[p];
                    (1.0, x, z)
                }
                None => (0.0, 0.0, 0.0),
            },
            Some(kids) => {
                let mut mass = 0.0;
                let mut sx = 0.0;
                let mut sz = 0.0;
                for kid in kids {
                    let (m, x, z) = self.aggregate(kid);
                    mass += m;
                    sx += m * x;
                    sz += m * z;
                }
                if mass > 0.0 {
                    (mass, sx / mass, sz / mass)
                } else {
                    (0.0, 0.0, 0.0)
                }
            }
        };
        let cell = &mut self.cells[cell_idx];
        cell.mass = mass;
        cell.com_x = com_x;
        cell.com_z = com_z;
        (mass, com_x, com_z)
    }

    /// Accumulated many-body force on point `i`. `strength` is negative for
    /// repulsion, matching the charge convention.
    pub fn force_on(
        &self,
        i: usize,
        theta: f32,
        dist_min: f32,
        dist_max: f32,
        strength: f32,
    ) -> (f32, f32) {
        let (px, pz) = self.points[i];
        let mut fx = 0.0;
        let mut fz = 0.0;
        let theta2 = theta * theta;
        let min2 = dist_min * dist_min;
        let max2 = dist_max * dist_max;

        let mut stack = vec![0usize];
        while let Some(cell_idx) = stack.pop() {
            let cell = &self.cells[cell_idx];
            if cell.mass == 0.0 {
                continue;
            }
            let dx = px - cell.com_x;
            let dz = pz - cell.com_z;
            let mut d2 = dx * dx + dz * dz;
            let width = cell.half * 2.0;

            let is_leaf = cell.children.is_none();
            let far_enough = width * width < theta2 * d2;
            if is_leaf || far_enough {
                if is_leaf && cell.point == Some(i) {
                    continue;
                }
                if d2 > max2 {
                    continue;
                }
                if d2 < min2 {
                    d2 = min2.max(1e-4);
                }
                // Skip exactly-coincident clusters; jitter separates them
                // next tick.
                if d2 <= 1e-8 {
                    continue;
                }
                let f = -strength * cell.mass / d2;
                let d = d2.sqrt();
                fx += f * dx / d;
                fz += f * dz / d;
            } else if let Some(kids) = cell.children {
                stack.extend(kids);
            }
        }
        (fx, fz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_points_repel_along_their_axis() {
        let tree = QuadTree::build(&[(0.0, 0.0), (10.0, 0.0)]);
        let (fx, fz) = tree.force_on(0, 0.9, 1.0, 1000.0, -30.0);
        assert!(fx < 0.0, "left point pushed further left, got {fx}");
        assert!(fz.abs() < 1e-4);
        let (fx2, _) = tree.force_on(1, 0.9, 1.0, 1000.0, -30.0);
        assert!(fx2 > 0.0);
    }

    #[test]
    fn distant_cluster_approximates_to_one_term() {
        let mut pts = vec![(1000.0, 1000.0)];
        for i in 0..50 {
            pts.push((i as f32 * 0.1, 0.0));
        }
        let tree = QuadTree::build(&pts);
        // Exact pairwise sum for comparison.
        let (px, pz) = pts[0];
        let mut ex = 0.0f32;
        let mut ez = 0.0f32;
        for (x, z) in pts.iter().skip(1) {
            let dx = px - x;
            let dz = pz - z;
            let d2 = dx * dx + dz * dz;
            let f = 30.0 / d2;
            let d = d2.sqrt();
            ex += f * dx / d;
            ez += f * dz / d;
        }
        let (fx, fz) = tree.force_on(0, 0.9, 1.0, 1e6, -30.0);
        assert!((fx - ex).abs() / ex.abs() < 0.05, "{fx} vs {ex}");
        assert!((fz - ez).abs() / ez.abs() < 0.05, "{fz} vs {ez}");
    }

    #[test]
    fn coincident_points_do_not_recurse_forever() {
        let tree = QuadTree::build(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        let (fx, fz) = tree.force_on(0, 0.9, 1.0, 1000.0, -30.0);
        assert!(fx.is_finite() && fz.is_finite());
    }
}
