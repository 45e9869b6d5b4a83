//! Flat id maps for scenes and plots, plus the tree structure between them.

use std::collections::{HashMap, HashSet};

use vantage_engine::render::Backend;
use vantage_proto::{PlotDescription, PlotId, SceneDescription, SceneId};

use crate::camera::Camera;
use crate::plot::Plot;
use crate::scene::Scene;
use crate::SceneError;

/// One step of the depth-first traversal shared by rendering and picking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Entering a visible scene: set its viewport, clear if it asks to.
    Scene(SceneId),
    /// A plot of the scene entered last.
    Plot(PlotId),
}

/// Owner of every scene and plot of one canvas.
#[derive(Default)]
pub struct Registry {
    scenes: HashMap<SceneId, Scene>,
    plots: HashMap<PlotId, Plot>,
    owners: HashMap<PlotId, SceneId>,
    root: Option<SceneId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&SceneId> {
        self.root.as_ref()
    }

    pub fn find_scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn find_plot(&self, id: &PlotId) -> Option<&Plot> {
        self.plots.get(id)
    }

    pub fn find_plot_mut(&mut self, id: &PlotId) -> Option<&mut Plot> {
        self.plots.get_mut(id)
    }

    /// Scene that owns `plot`.
    pub fn owner(&self, plot: &PlotId) -> Option<&SceneId> {
        self.owners.get(plot)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    /// A plot together with the camera of its scene.
    pub fn plot_and_camera(&mut self, id: &PlotId) -> Option<(&mut Plot, &Camera)> {
        let camera = self.scenes.get(self.owners.get(id)?)?.camera();
        let plot = self.plots.get_mut(id)?;
        Some((plot, camera))
    }

    /// Installs `desc` as the root, disposing any previous tree first.
    pub fn replace_root(
        &mut self,
        desc: SceneDescription,
        backend: &mut dyn Backend,
    ) -> Result<SceneId, SceneError> {
        if let Some(old) = self.root.clone() {
            self.delete_scenes(backend, &[old], &[]);
        }
        let id = self.insert_scene_tree(desc, None)?;
        self.root = Some(id.clone());
        Ok(id)
    }

    /// Inserts a scene subtree under `parent` (or detached, for `None`).
    /// Ids are checked up front, so a failed insert leaves the registry
    /// untouched.
    pub fn insert_scene_tree(
        &mut self,
        desc: SceneDescription,
        parent: Option<SceneId>,
    ) -> Result<SceneId, SceneError> {
        if let Some(parent) = &parent {
            if !self.scenes.contains_key(parent) {
                return Err(SceneError::UnknownScene(parent.clone()));
            }
        }
        self.check_tree_ids(&desc)?;

        let mut scenes = Vec::new();
        let mut plots = Vec::new();
        build_tree(desc, parent.clone(), &mut scenes, &mut plots)?;

        let root_id = scenes[0].id().clone();
        if let Some(parent) = parent.and_then(|p| self.scenes.get_mut(&p)) {
            parent.children.push(root_id.clone());
        }
        for scene in scenes {
            log::debug!("scene `{}` inserted with {} plots", scene.id(), scene.plots.len());
            self.scenes.insert(scene.id().clone(), scene);
        }
        for (owner, plot) in plots {
            self.owners.insert(plot.id().clone(), owner);
            self.plots.insert(plot.id().clone(), plot);
        }
        Ok(root_id)
    }

    fn check_tree_ids(&self, desc: &SceneDescription) -> Result<(), SceneError> {
        let mut scene_ids = HashSet::new();
        let mut plot_ids = HashSet::new();
        let mut stack = vec![desc];
        while let Some(scene) = stack.pop() {
            if self.scenes.contains_key(&scene.id) || !scene_ids.insert(&scene.id) {
                return Err(SceneError::DuplicateId(scene.id.to_string()));
            }
            for plot in &scene.plots {
                if self.plots.contains_key(&plot.id) || !plot_ids.insert(&plot.id) {
                    return Err(SceneError::DuplicateId(plot.id.to_string()));
                }
            }
            stack.extend(scene.children.iter());
        }
        Ok(())
    }

    /// Appends plots to `scene`, in order. All-or-nothing.
    pub fn insert_plots(
        &mut self,
        scene: &SceneId,
        descs: Vec<PlotDescription>,
    ) -> Result<(), SceneError> {
        let target = self.scenes.get(scene).ok_or_else(|| SceneError::UnknownScene(scene.clone()))?;

        let mut seen = HashSet::new();
        for desc in &descs {
            if self.plots.contains_key(&desc.id) || !seen.insert(&desc.id) {
                return Err(SceneError::DuplicateId(desc.id.to_string()));
            }
        }

        let built = descs
            .into_iter()
            .map(|desc| Plot::new(desc, target.camera()))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(target) = self.scenes.get_mut(scene) else {
            return Err(SceneError::UnknownScene(scene.clone()));
        };
        for plot in built {
            log::debug!("plot `{}` inserted into scene `{scene}`", plot.id());
            target.plots.push(plot.id().clone());
            self.owners.insert(plot.id().clone(), scene.clone());
            self.plots.insert(plot.id().clone(), plot);
        }
        Ok(())
    }

    /// Deletes plots by id, releasing their resources. Absent ids are
    /// ignored.
    pub fn delete_plots(&mut self, backend: &mut dyn Backend, scene: &SceneId, ids: &[PlotId]) {
        for id in ids {
            if let Some(owner) = self.owners.get(id) {
                if owner != scene {
                    log::debug!("plot `{id}` is owned by `{owner}`, not `{scene}`; deleting anyway");
                }
            }
            self.remove_plot(backend, id);
        }
    }

    fn remove_plot(&mut self, backend: &mut dyn Backend, id: &PlotId) {
        if let Some(owner) = self.owners.remove(id) {
            if let Some(scene) = self.scenes.get_mut(&owner) {
                scene.plots.retain(|p| p != id);
            }
        }
        if let Some(plot) = self.plots.remove(id) {
            plot.dispose(backend);
        }
    }

    /// Deletes `plots`, then each scene in `scenes` with its whole subtree.
    /// Absent ids are ignored.
    pub fn delete_scenes(&mut self, backend: &mut dyn Backend, scenes: &[SceneId], plots: &[PlotId]) {
        for id in plots {
            self.remove_plot(backend, id);
        }
        for id in scenes {
            let parent = self.scenes.get(id).and_then(|s| s.parent().cloned());
            if let Some(parent) = parent.and_then(|p| self.scenes.get_mut(&p)) {
                parent.children.retain(|c| c != id);
            }
            self.remove_subtree(backend, id);
            if self.root.as_ref() == Some(id) {
                self.root = None;
            }
        }
    }

    fn remove_subtree(&mut self, backend: &mut dyn Backend, id: &SceneId) {
        let Some(scene) = self.scenes.remove(id) else {
            return;
        };
        for plot in &scene.plots {
            self.owners.remove(plot);
            if let Some(plot) = self.plots.remove(plot) {
                plot.dispose(backend);
            }
        }
        for child in &scene.children {
            self.remove_subtree(backend, child);
        }
        log::debug!("scene `{id}` deleted");
    }

    /// Disposes everything, releasing all backend resources.
    pub fn dispose_all(&mut self, backend: &mut dyn Backend) {
        for (_, plot) in self.plots.drain() {
            plot.dispose(backend);
        }
        self.owners.clear();
        self.scenes.clear();
        self.root = None;
    }

    /// Depth-first order from the root: a scene, its plots in insertion
    /// order, then its children in registration order. Invisible scenes are
    /// skipped with their whole subtree.
    pub fn traversal(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        if let Some(root) = &self.root {
            self.walk(root, &mut steps);
        }
        steps
    }

    fn walk(&self, id: &SceneId, steps: &mut Vec<Step>) {
        let Some(scene) = self.scenes.get(id) else {
            return;
        };
        if !scene.is_visible() {
            return;
        }
        steps.push(Step::Scene(id.clone()));
        steps.extend(scene.plots().iter().cloned().map(Step::Plot));
        for child in scene.children() {
            self.walk(child, steps);
        }
    }
}

/// Builds scenes and plots of a subtree without touching the registry,
/// parent first.
fn build_tree(
    desc: SceneDescription,
    parent: Option<SceneId>,
    scenes: &mut Vec<Scene>,
    plots: &mut Vec<(SceneId, Plot)>,
) -> Result<(), SceneError> {
    let mut scene = Scene::new(&desc, parent);
    let id = scene.id().clone();
    for plot in desc.plots {
        let plot = Plot::new(plot, scene.camera())?;
        scene.plots.push(plot.id().clone());
        plots.push((id.clone(), plot));
    }
    scene.children = desc.children.iter().map(|c| c.id.clone()).collect();
    scenes.push(scene);
    for child in desc.children {
        build_tree(child, Some(id.clone()), scenes, plots)?;
    }
    Ok(())
}
