//! Reading faces, loops, edges and curves out of the kernel.

use skp_math::{DVec3, UnitConverter};

use crate::geometry::{Curve, Edge, Face, Loop, Opening};
use crate::kernel::{
    Bridge, BridgeError, BridgeResult, CurveRef, CurveType, DrawingElementRef, EdgeRef, FaceRef,
    Kernel, LoopRef, OpeningRef, Owned, Query,
};
use crate::mesh::Mesh;

use super::materials::MaterialRegistry;

/// Chaining tolerance when orienting loop edges, in canonical units.
const CHAIN_TOLERANCE: f64 = 1e-9;

/// Converts geometry handles into document geometry, converting lengths on
/// the way.
pub struct GeometryReader<'k, K: Kernel + ?Sized> {
    bridge: Bridge<'k, K>,
    units: UnitConverter,
    include_meshes: bool,
}

impl<'k, K: Kernel + ?Sized> GeometryReader<'k, K> {
    pub fn new(bridge: Bridge<'k, K>, units: UnitConverter, include_meshes: bool) -> Self {
        Self {
            bridge,
            units,
            include_meshes,
        }
    }

    pub fn units(&self) -> UnitConverter {
        self.units
    }

    pub fn read_face(&self, face: FaceRef, materials: &mut MaterialRegistry) -> BridgeResult<Face> {
        let bridge = self.bridge;

        let outer_loop = self.read_loop(bridge.face_outer_loop(face)?)?;
        let inner_loops = bridge
            .list(Query::inner_loops(face))?
            .into_iter()
            .map(|lp| self.read_loop(lp))
            .collect::<BridgeResult<Vec<_>>>()?;
        let openings = bridge
            .list(Query::openings(face))?
            .into_iter()
            .map(|o| self.read_opening(o))
            .collect::<BridgeResult<Vec<_>>>()?;
        let vertices = bridge
            .list(Query::face_vertices(face))?
            .into_iter()
            .map(|v| -> BridgeResult<DVec3> {
                Ok(self.units.point_to_canonical(bridge.vertex_position(v)?))
            })
            .collect::<BridgeResult<Vec<_>>>()?;

        let mesh = if self.include_meshes {
            Some(self.read_mesh(face)?)
        } else {
            None
        };

        Ok(Face {
            persistent_id: bridge.entity_persistent_id(face.to_entity())?,
            outer_loop,
            inner_loops,
            openings,
            vertices,
            normal: bridge.face_normal(face)?,
            area: self.units.area_to_canonical(bridge.face_area(face)?),
            front_material: materials.resolve(bridge, bridge.face_front_material(face)?)?,
            back_material: materials.resolve(bridge, bridge.face_back_material(face)?)?,
            layer: self.layer_name(face.to_drawing_element())?,
            mesh,
        })
    }

    /// Edges of a loop in order, flipped where needed so that each edge
    /// starts where the previous one ended.
    pub fn read_loop(&self, lp: LoopRef) -> BridgeResult<Loop> {
        let mut edges = self
            .bridge
            .list(Query::loop_edges(lp))?
            .into_iter()
            .map(|e| self.read_edge(e))
            .collect::<BridgeResult<Vec<_>>>()?;
        orient_chain(&mut edges);
        Ok(Loop::new(edges))
    }

    pub fn read_edge(&self, edge: EdgeRef) -> BridgeResult<Edge> {
        let bridge = self.bridge;
        let start = bridge.vertex_position(bridge.edge_start(edge)?)?;
        let end = bridge.vertex_position(bridge.edge_end(edge)?)?;

        let curve = bridge.edge_curve(edge)?;
        let is_arc_segment =
            bridge.is_valid(curve) && bridge.curve_type(curve)? == CurveType::Arc;

        Ok(Edge {
            start: self.units.point_to_canonical(start),
            end: self.units.point_to_canonical(end),
            layer: self.layer_name(edge.to_drawing_element())?,
            is_arc_segment,
        })
    }

    pub fn read_curve(&self, curve: CurveRef) -> BridgeResult<Curve> {
        let edges = self
            .bridge
            .list(Query::curve_edges(curve))?
            .into_iter()
            .map(|e| self.read_edge(e))
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(Curve {
            edges,
            is_arc: self.bridge.curve_type(curve)? == CurveType::Arc,
        })
    }

    fn read_opening(&self, opening: OpeningRef) -> BridgeResult<Opening> {
        let points = self.bridge.sequence(
            |k| k.opening_point_count(opening),
            |k, out| k.opening_points(opening, out),
        )?;
        Ok(Opening {
            points: points
                .into_iter()
                .map(|p| self.units.point_to_canonical(p))
                .collect(),
        })
    }

    /// Triangulate through the kernel's mesh helper, released afterwards.
    fn read_mesh(&self, face: FaceRef) -> BridgeResult<Mesh> {
        let kernel = self.bridge.kernel();
        let helper = Owned::new(kernel, kernel.mesh_helper_create(face)?);
        let h = helper.get();

        let positions: Vec<DVec3> = self
            .bridge
            .sequence(|k| k.mesh_vertex_count(h), |k, out| k.mesh_vertices(h, out))?
            .into_iter()
            .map(|p| self.units.point_to_canonical(p))
            .collect();
        let normals = self
            .bridge
            .sequence(|k| k.mesh_vertex_count(h), |k, out| k.mesh_normals(h, out))?;
        let indices = narrow_indices(
            self.bridge
                .sequence(|k| k.mesh_index_count(h), |k, out| k.mesh_indices(h, out))?,
        )?;

        let mut mesh = Mesh::from_flat_indices(positions, normals, &indices);
        mesh.ensure_normals();
        Ok(mesh)
    }

    /// Name of an element's layer, empty if it has none.
    pub fn layer_name(&self, element: DrawingElementRef) -> BridgeResult<String> {
        let layer = self.bridge.element_layer(element)?;
        if self.bridge.is_valid(layer) {
            self.bridge.layer_name(layer)
        } else {
            Ok(String::new())
        }
    }
}

/// Flip edges that run against the loop direction.
fn orient_chain(edges: &mut [Edge]) {
    if edges.len() < 2 {
        return;
    }
    // the first edge may itself be reversed relative to the second
    let second = &edges[1];
    let first = &edges[0];
    let joins = |p: DVec3| {
        p.distance(second.start) <= CHAIN_TOLERANCE || p.distance(second.end) <= CHAIN_TOLERANCE
    };
    if !joins(first.end) && joins(first.start) {
        let edge = &mut edges[0];
        std::mem::swap(&mut edge.start, &mut edge.end);
    }

    for i in 1..edges.len() {
        let previous_end = edges[i - 1].end;
        let edge = &mut edges[i];
        if edge.start.distance(previous_end) > CHAIN_TOLERANCE
            && edge.end.distance(previous_end) <= CHAIN_TOLERANCE
        {
            std::mem::swap(&mut edge.start, &mut edge.end);
        }
    }
}

/// Mesh indices as `u32`; an index past `u32::MAX` is out of range.
fn narrow_indices(indices: Vec<usize>) -> BridgeResult<Vec<u32>> {
    indices
        .into_iter()
        .map(|i| u32::try_from(i).map_err(|_| BridgeError::OutOfRange))
        .collect()
}
