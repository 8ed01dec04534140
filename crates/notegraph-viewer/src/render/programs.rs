//! Pluggable edge/node programs. The registry is keyed by program name; the
//! scene picks an edge program per configured layer style and a node program
//! per node kind. New styles are additions to the registry, nothing else.

use bevy::prelude::*;
use notegraph_core::EdgeStyle;
use std::collections::HashMap;

pub struct EdgeDrawParams {
    pub thickness: f32,
}

pub trait EdgeProgram: Send + Sync {
    fn name(&self) -> &'static str;
    fn draw(&self, gizmos: &mut Gizmos, a: Vec3, b: Vec3, color: Color, params: &EdgeDrawParams);
}

pub trait NodeProgram: Send + Sync {
    fn name(&self) -> &'static str;
    fn mesh(&self, meshes: &mut Assets<Mesh>, size: f32) -> Handle<Mesh>;
}

fn thick_offsets(a: Vec3, b: Vec3, thickness: f32) -> Vec<Vec3> {
    if thickness <= 1.5 {
        return vec![Vec3::ZERO];
    }
    let dir = (b - a).normalize_or_zero();
    let side = dir.cross(Vec3::Y).normalize_or_zero() * 0.12;
    vec![Vec3::ZERO, side, -side]
}

struct SolidProgram;

impl EdgeProgram for SolidProgram {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn draw(&self, gizmos: &mut Gizmos, a: Vec3, b: Vec3, color: Color, params: &EdgeDrawParams) {
        for off in thick_offsets(a, b, params.thickness) {
            gizmos.line(a + off, b + off, color);
        }
    }
}

struct DashedProgram;

impl EdgeProgram for DashedProgram {
    fn name(&self) -> &'static str {
        "dashed"
    }

    fn draw(&self, gizmos: &mut Gizmos, a: Vec3, b: Vec3, color: Color, params: &EdgeDrawParams) {
        let len = (b - a).length();
        if len < 0.01 {
            return;
        }
        let dir = (b - a) / len;
        let dash = 2.2;
        let gap = 1.6;
        let mut t = 0.0;
        while t < len {
            let end = (t + dash).min(len);
            for off in thick_offsets(a, b, params.thickness) {
                gizmos.line(a + dir * t + off, a + dir * end + off, color);
            }
            t += dash + gap;
        }
    }
}

struct DottedProgram;

impl EdgeProgram for DottedProgram {
    fn name(&self) -> &'static str {
        "dotted"
    }

    fn draw(&self, gizmos: &mut Gizmos, a: Vec3, b: Vec3, color: Color, _params: &EdgeDrawParams) {
        let len = (b - a).length();
        if len < 0.01 {
            return;
        }
        let dir = (b - a) / len;
        let step = 1.8;
        let dot = 0.35;
        let mut t = 0.0;
        while t < len {
            let end = (t + dot).min(len);
            gizmos.line(a + dir * t, a + dir * end, color);
            t += step;
        }
    }
}

struct CurvedProgram;

impl EdgeProgram for CurvedProgram {
    fn name(&self) -> &'static str {
        "curved"
    }

    fn draw(&self, gizmos: &mut Gizmos, a: Vec3, b: Vec3, color: Color, params: &EdgeDrawParams) {
        let mid = (a + b) * 0.5;
        let dir = (b - a).normalize_or_zero();
        let bulge = dir.cross(Vec3::Y) * (b - a).length() * 0.18;
        let control = mid + bulge;
        let segments = 14;
        let mut prev = a;
        for i in 1..=segments {
            let t = i as f32 / segments as f32;
            let p = a.lerp(control, t).lerp(control.lerp(b, t), t);
            for off in thick_offsets(a, b, params.thickness) {
                gizmos.line(prev + off, p + off, color);
            }
            prev = p;
        }
    }
}

/// Moving dashes along a directed edge; flow-only twins draw nothing else.
pub fn draw_flow(
    gizmos: &mut Gizmos,
    a: Vec3,
    b: Vec3,
    color: Color,
    phase: f32,
    spacing: f32,
    thickness: f32,
) {
    let len = (b - a).length();
    if len < 0.01 {
        return;
    }
    let dir = (b - a) / len;
    let spacing = spacing.max(2.0);
    let dash = (spacing * 0.35).max(0.6) * thickness.clamp(0.5, 3.0);
    let mut t = phase * spacing;
    while t < len {
        let end = (t + dash).min(len);
        gizmos.line(a + dir * t, a + dir * end, color);
        t += spacing;
    }
}

struct NoteCardProgram;

impl NodeProgram for NoteCardProgram {
    fn name(&self) -> &'static str {
        "note_card"
    }

    fn mesh(&self, meshes: &mut Assets<Mesh>, size: f32) -> Handle<Mesh> {
        let s = size * 0.1;
        meshes.add(Cuboid::new(s * 1.6, s * 0.35, s))
    }
}

struct HubProgram;

impl NodeProgram for HubProgram {
    fn name(&self) -> &'static str {
        "hub"
    }

    fn mesh(&self, meshes: &mut Assets<Mesh>, size: f32) -> Handle<Mesh> {
        meshes.add(Sphere::new(size * 0.06))
    }
}

#[derive(Resource)]
pub struct ProgramRegistry {
    edges: HashMap<&'static str, Box<dyn EdgeProgram>>,
    nodes: HashMap<&'static str, Box<dyn NodeProgram>>,
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        let mut registry = Self {
            edges: HashMap::new(),
            nodes: HashMap::new(),
        };
        registry.register_edge(Box::new(SolidProgram));
        registry.register_edge(Box::new(DashedProgram));
        registry.register_edge(Box::new(DottedProgram));
        registry.register_edge(Box::new(CurvedProgram));
        registry.register_node(Box::new(NoteCardProgram));
        registry.register_node(Box::new(HubProgram));
        registry
    }
}

impl ProgramRegistry {
    pub fn register_edge(&mut self, program: Box<dyn EdgeProgram>) {
        self.edges.insert(program.name(), program);
    }

    pub fn register_node(&mut self, program: Box<dyn NodeProgram>) {
        self.nodes.insert(program.name(), program);
    }

    pub fn edge(&self, style: EdgeStyle) -> &dyn EdgeProgram {
        self.edges
            .get(style.as_str())
            .or_else(|| self.edges.get("solid"))
            .map(|b| b.as_ref())
            .expect("solid edge program registered")
    }

    pub fn node(&self, name: &str) -> &dyn NodeProgram {
        self.nodes
            .get(name)
            .or_else(|| self.nodes.get("note_card"))
            .map(|b| b.as_ref())
            .expect("note_card node program registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_configured_style() {
        let registry = ProgramRegistry::default();
        for style in [
            EdgeStyle::Solid,
            EdgeStyle::Dashed,
            EdgeStyle::Dotted,
            EdgeStyle::Curved,
        ] {
            assert_eq!(registry.edge(style).name(), style.as_str());
        }
        assert_eq!(registry.node("hub").name(), "hub");
        assert_eq!(registry.node("unknown").name(), "note_card");
    }
}
