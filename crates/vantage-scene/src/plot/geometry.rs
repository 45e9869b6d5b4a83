//! Attribute buffers and the capacity-aware rebuild policy.
//!
//! Every attribute keeps a CPU backing array sized to its allocated
//! capacity. Updates that fit are written in place; updates that grow an
//! attribute are staged until every co-attribute of the same step mode has
//! staged the same new length, and only then is the geometry rebuilt.

use std::collections::{BTreeMap, BTreeSet};

use vantage_engine::render::{AttributeSpec, Backend, GeometryId, GeometrySpec, StepMode};
use vantage_proto::{AttributeDescription, PlotId};

use crate::SceneError;

/// Name of the pseudo-attribute that replaces the index buffer.
pub const FACES: &str = "faces";

/// Draw path of a plot, fixed when the plot is built.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PlotKind {
    Mesh,
    Instanced,
}

/// What an attribute update did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttributeUpdate {
    /// Fit in the allocated capacity; written in place.
    InPlace,
    /// Grew past capacity; waiting for co-attributes to stage the same length.
    Deferred,
    /// All co-attributes agreed; the geometry will be rebuilt at the new size.
    Rebuilt,
}

#[derive(Debug)]
pub struct AttributeBuffer {
    item_size: u32,
    step: StepMode,
    /// `capacity * item_size` floats.
    data: Vec<f32>,
    len: usize,
    staged: Option<(Vec<f32>, usize)>,
}

impl AttributeBuffer {
    fn new(
        plot: &PlotId,
        name: &str,
        desc: &AttributeDescription,
        step: StepMode,
    ) -> Result<Self, SceneError> {
        if !(1..=4).contains(&desc.item_size) || desc.data.len() % desc.item_size as usize != 0 {
            return Err(SceneError::InvalidAttribute {
                plot: plot.clone(),
                name: name.to_string(),
                reason: format!(
                    "{} values do not form items of size {}",
                    desc.data.len(),
                    desc.item_size
                ),
            });
        }
        Ok(Self {
            item_size: desc.item_size,
            step,
            data: desc.data.clone(),
            len: desc.len(),
            staged: None,
        })
    }

    pub fn item_size(&self) -> u32 {
        self.item_size
    }

    pub fn step(&self) -> StepMode {
        self.step
    }

    /// Logical elements currently valid.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated elements.
    pub fn capacity(&self) -> usize {
        self.data.len() / self.item_size as usize
    }

    /// Length of a staged, not yet applied, growth.
    pub fn staged_len(&self) -> Option<usize> {
        self.staged.as_ref().map(|(_, len)| *len)
    }

    /// The valid prefix of the backing array.
    pub fn values(&self) -> &[f32] {
        &self.data[..self.len * self.item_size as usize]
    }
}

/// CPU side of a plot's geometry plus its backend handle.
#[derive(Debug)]
pub struct Geometry {
    plot: PlotId,
    kind: PlotKind,
    attributes: BTreeMap<String, AttributeBuffer>,
    faces: Vec<u32>,
    instance_count: u32,
    handle: Option<GeometryId>,
    dirty: BTreeSet<String>,
    stale: bool,
    rebuilds: u32,
}

impl Geometry {
    pub fn new(
        plot: &PlotId,
        vertex_arrays: &BTreeMap<String, AttributeDescription>,
        faces: &[u32],
        instance_attributes: Option<&BTreeMap<String, AttributeDescription>>,
    ) -> Result<Self, SceneError> {
        let mut attributes = BTreeMap::new();
        for (name, desc) in vertex_arrays {
            attributes.insert(name.clone(), AttributeBuffer::new(plot, name, desc, StepMode::Vertex)?);
        }

        let kind = match instance_attributes {
            Some(instanced) => {
                for (name, desc) in instanced {
                    if attributes.contains_key(name) {
                        return Err(SceneError::InvalidAttribute {
                            plot: plot.clone(),
                            name: name.clone(),
                            reason: "declared as both vertex and instance attribute".to_string(),
                        });
                    }
                    let buffer = AttributeBuffer::new(plot, name, desc, StepMode::Instance)?;
                    attributes.insert(name.clone(), buffer);
                }
                PlotKind::Instanced
            }
            None => PlotKind::Mesh,
        };

        let mut geometry = Self {
            plot: plot.clone(),
            kind,
            attributes,
            faces: faces.to_vec(),
            instance_count: 0,
            handle: None,
            dirty: BTreeSet::new(),
            stale: true,
            rebuilds: 0,
        };
        geometry.instance_count = geometry.min_len(StepMode::Instance) as u32;
        Ok(geometry)
    }

    pub fn kind(&self) -> PlotKind {
        self.kind
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeBuffer> {
        self.attributes.get(name)
    }

    pub fn faces(&self) -> &[u32] {
        &self.faces
    }

    pub fn handle(&self) -> Option<GeometryId> {
        self.handle
    }

    /// Rebuilds decided since construction.
    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }

    fn min_len(&self, step: StepMode) -> usize {
        self.attributes
            .values()
            .filter(|a| a.step == step)
            .map(|a| a.len)
            .min()
            .unwrap_or(0)
    }

    /// Indices for indexed geometry, vertices otherwise.
    pub fn draw_count(&self) -> u32 {
        if self.faces.is_empty() {
            self.min_len(StepMode::Vertex) as u32
        } else {
            self.faces.len() as u32
        }
    }

    pub fn instances(&self) -> Option<u32> {
        match self.kind {
            PlotKind::Mesh => None,
            PlotKind::Instanced => Some(self.instance_count),
        }
    }

    /// Applies one host update; `data` holds at least `length * item_size`
    /// floats. See the module docs for the rebuild policy.
    pub fn update(
        &mut self,
        name: &str,
        data: &[f32],
        length: usize,
    ) -> Result<AttributeUpdate, SceneError> {
        if name == FACES {
            return self.replace_faces(data, length);
        }

        let plot = &self.plot;
        let attr = self.attributes.get_mut(name).ok_or_else(|| SceneError::UnknownAttribute {
            plot: plot.clone(),
            name: name.to_string(),
        })?;

        let needed = length * attr.item_size as usize;
        if data.len() < needed {
            return Err(SceneError::InvalidAttribute {
                plot: plot.clone(),
                name: name.to_string(),
                reason: format!("length {length} needs {needed} values, got {}", data.len()),
            });
        }

        let step = attr.step;
        if length <= attr.capacity() {
            attr.data[..needed].copy_from_slice(&data[..needed]);
            attr.len = length;
            attr.staged = None;
            self.dirty.insert(name.to_string());
            if step == StepMode::Instance {
                self.instance_count = length as u32;
            }
            return Ok(AttributeUpdate::InPlace);
        }

        attr.staged = Some((data[..needed].to_vec(), length));

        let ready = self
            .attributes
            .values()
            .filter(|a| a.step == step)
            .all(|a| a.staged_len() == Some(length));
        if !ready {
            log::debug!(
                "plot `{}`: `{name}` grew to {length}, waiting for co-attributes",
                self.plot
            );
            return Ok(AttributeUpdate::Deferred);
        }

        for attr in self.attributes.values_mut().filter(|a| a.step == step) {
            if let Some((values, len)) = attr.staged.take() {
                attr.data = values;
                attr.len = len;
            }
        }
        if step == StepMode::Instance {
            self.instance_count = length as u32;
        }
        self.stale = true;
        self.rebuilds += 1;
        log::debug!("plot `{}`: rebuilding geometry at {length} elements", self.plot);
        Ok(AttributeUpdate::Rebuilt)
    }

    fn replace_faces(&mut self, data: &[f32], length: usize) -> Result<AttributeUpdate, SceneError> {
        if data.len() < length {
            return Err(SceneError::InvalidAttribute {
                plot: self.plot.clone(),
                name: FACES.to_string(),
                reason: format!("length {length} exceeds {} values", data.len()),
            });
        }
        self.faces = data[..length].iter().map(|&i| i as u32).collect();
        self.stale = true;
        self.rebuilds += 1;
        Ok(AttributeUpdate::Rebuilt)
    }

    /// Creates or rebuilds the backend geometry if needed and flushes dirty
    /// attributes.
    pub fn sync(&mut self, backend: &mut dyn Backend) -> Result<GeometryId, SceneError> {
        if let (Some(handle), false) = (self.handle, self.stale) {
            for name in std::mem::take(&mut self.dirty) {
                if let Some(attr) = self.attributes.get(&name) {
                    backend.write_attribute(handle, &name, attr.values())?;
                }
            }
            return Ok(handle);
        }

        if let Some(old) = self.handle.take() {
            backend.destroy_geometry(old);
        }
        let label = self.plot.to_string();
        let spec = GeometrySpec {
            label: &label,
            attributes: self
                .attributes
                .iter()
                .map(|(name, a)| AttributeSpec {
                    name,
                    item_size: a.item_size,
                    step: a.step,
                    data: &a.data,
                })
                .collect(),
            indices: &self.faces,
        };
        let handle = backend.create_geometry(&spec)?;
        self.handle = Some(handle);
        self.stale = false;
        self.dirty.clear();
        Ok(handle)
    }

    pub fn release(&mut self, backend: &mut dyn Backend) {
        if let Some(handle) = self.handle.take() {
            backend.destroy_geometry(handle);
        }
        self.stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_engine::render::SoftBackend;

    fn attr(data: &[f32], item_size: u32) -> AttributeDescription {
        AttributeDescription { data: data.to_vec(), item_size }
    }

    fn triangle_mesh() -> Geometry {
        let mut vertex = BTreeMap::new();
        vertex.insert("position".to_string(), attr(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 2));
        vertex.insert("color".to_string(), attr(&[1.0; 9], 3));
        Geometry::new(&PlotId::from("mesh"), &vertex, &[], None).unwrap()
    }

    fn instanced() -> Geometry {
        let mut vertex = BTreeMap::new();
        vertex.insert("position".to_string(), attr(&[0.0; 6], 2));
        let mut inst = BTreeMap::new();
        inst.insert("offset".to_string(), attr(&[0.0; 6], 3));
        inst.insert("scale".to_string(), attr(&[1.0; 2], 1));
        Geometry::new(&PlotId::from("inst"), &vertex, &[], Some(&inst)).unwrap()
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn kind_follows_instance_attributes() {
        assert_eq!(triangle_mesh().kind(), PlotKind::Mesh);
        assert_eq!(triangle_mesh().instances(), None);
        let g = instanced();
        assert_eq!(g.kind(), PlotKind::Instanced);
        assert_eq!(g.instances(), Some(2));
    }

    #[test]
    fn ragged_attribute_is_rejected() {
        let mut vertex = BTreeMap::new();
        vertex.insert("position".to_string(), attr(&[0.0; 5], 2));
        let err = Geometry::new(&PlotId::from("p"), &vertex, &[], None).unwrap_err();
        assert!(matches!(err, SceneError::InvalidAttribute { .. }));
    }

    // ── growth policy ─────────────────────────────────────────────────────

    #[test]
    fn rebuilds_exactly_when_length_exceeds_capacity() {
        let mut vertex = BTreeMap::new();
        vertex.insert("position".to_string(), attr(&[0.0; 8], 2));
        let mut g = Geometry::new(&PlotId::from("p"), &vertex, &[], None).unwrap();

        let lengths = [2usize, 4, 6, 3, 6, 7, 1];
        let mut capacity = 4;
        let mut expected_rebuilds = 0;
        for len in lengths {
            let outcome = g.update("position", &vec![0.5; len * 2], len).unwrap();
            if len > capacity {
                expected_rebuilds += 1;
                capacity = len;
                assert_eq!(outcome, AttributeUpdate::Rebuilt);
            } else {
                assert_eq!(outcome, AttributeUpdate::InPlace);
            }
            let a = g.attribute("position").unwrap();
            assert_eq!(a.len(), len);
            assert_eq!(a.capacity(), capacity);
            assert_eq!(g.draw_count(), len as u32);
        }
        assert_eq!(g.rebuilds(), expected_rebuilds);
    }

    #[test]
    fn growth_waits_for_every_co_attribute() {
        let mut g = triangle_mesh();
        let out = g.update("position", &[0.0; 8], 4).unwrap();
        assert_eq!(out, AttributeUpdate::Deferred);
        assert_eq!(g.attribute("position").unwrap().len(), 3);
        assert_eq!(g.draw_count(), 3);
        assert_eq!(g.rebuilds(), 0);

        let out = g.update("color", &[0.5; 12], 4).unwrap();
        assert_eq!(out, AttributeUpdate::Rebuilt);
        assert_eq!(g.attribute("position").unwrap().capacity(), 4);
        assert_eq!(g.attribute("color").unwrap().len(), 4);
        assert_eq!(g.rebuilds(), 1);
    }

    #[test]
    fn mismatched_staged_lengths_keep_waiting() {
        let mut g = triangle_mesh();
        g.update("position", &[0.0; 8], 4).unwrap();
        assert_eq!(g.update("color", &[0.0; 15], 5).unwrap(), AttributeUpdate::Deferred);
        assert_eq!(g.update("position", &[0.0; 10], 5).unwrap(), AttributeUpdate::Rebuilt);
    }

    #[test]
    fn in_place_update_clears_stale_staging() {
        let mut g = triangle_mesh();
        g.update("position", &[0.0; 8], 4).unwrap();
        g.update("position", &[0.0; 4], 2).unwrap();
        assert_eq!(g.attribute("position").unwrap().staged_len(), None);
        assert_eq!(g.update("color", &[0.0; 12], 4).unwrap(), AttributeUpdate::Deferred);
    }

    #[test]
    fn instance_updates_set_instance_count() {
        let mut g = instanced();
        g.update("offset", &[0.0; 3], 1).unwrap();
        assert_eq!(g.instances(), Some(1));

        assert_eq!(g.update("offset", &[0.0; 15], 5).unwrap(), AttributeUpdate::Deferred);
        assert_eq!(g.instances(), Some(1));
        assert_eq!(g.update("scale", &[1.0; 5], 5).unwrap(), AttributeUpdate::Rebuilt);
        assert_eq!(g.instances(), Some(5));
        // Vertex attributes are not co-attributes of instance ones.
        assert_eq!(g.attribute("position").unwrap().len(), 3);
    }

    #[test]
    fn short_data_is_rejected() {
        let mut g = triangle_mesh();
        let err = g.update("position", &[0.0; 3], 2).unwrap_err();
        assert!(matches!(err, SceneError::InvalidAttribute { .. }));
        assert!(matches!(g.update("normal", &[], 0), Err(SceneError::UnknownAttribute { .. })));
    }

    #[test]
    fn faces_update_replaces_indices() {
        let mut g = triangle_mesh();
        assert_eq!(g.update(FACES, &[0.0, 1.0, 2.0, 2.0, 1.0, 0.0], 3).unwrap(), AttributeUpdate::Rebuilt);
        assert_eq!(g.faces(), &[0, 1, 2]);
        assert_eq!(g.draw_count(), 3);
    }

    // ── backend sync ──────────────────────────────────────────────────────

    #[test]
    fn sync_writes_in_place_and_recreates_on_rebuild() {
        let mut backend = SoftBackend::new(4, 4);
        let mut g = triangle_mesh();
        let first = g.sync(&mut backend).unwrap();

        g.update("position", &[9.0, 9.0], 1).unwrap();
        assert_eq!(g.sync(&mut backend).unwrap(), first);
        assert_eq!(&backend.attribute_data(first, "position").unwrap()[..2], &[9.0, 9.0]);

        g.update("position", &[0.0; 8], 4).unwrap();
        g.update("color", &[0.0; 12], 4).unwrap();
        let second = g.sync(&mut backend).unwrap();
        assert_ne!(second, first);
        assert_eq!(backend.live_resources().0, 1);
        assert_eq!(backend.attribute_data(second, "position").unwrap().len(), 8);

        g.release(&mut backend);
        assert_eq!(backend.live_resources().0, 0);
    }
}
