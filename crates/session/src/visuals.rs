//! Collaborator seams toward the renderer and the terrain model.
//!
//! The core never builds meshes or touches the scene graph; it asks a
//! [`RemoteVisuals`] implementation for an opaque handle per remote rider
//! and feeds it transforms. Terrain shape comes from a [`TrackSampler`],
//! a set of pure functions of world position and progress.

use glam::Vec3;
use protocol::Color;

/// Opaque handle to one remote rider's render representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualId(pub u64);

/// World transform pushed to the renderer each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rot_x: f32,
    pub rot_z: f32,
}

/// Render-side factory and sink for remote riders.
pub trait RemoteVisuals: Send {
    fn create(&mut self, color: Color, name: &str) -> VisualId;
    fn set_transform(&mut self, id: VisualId, transform: Transform);
    fn set_visible(&mut self, id: VisualId, visible: bool);
    fn remove(&mut self, id: VisualId);
}

/// Pure terrain sampling, provided by the world builder.
pub trait TrackSampler: Send {
    /// Lateral road-center offset at a world z.
    fn curve_x(&self, world_z: f64, distance: f64) -> f64;
    /// Derivative of the above, used for bike lean.
    fn curve_deriv(&self, world_z: f64, distance: f64) -> f64;
    /// Slope derivative, used for bike pitch.
    fn height_deriv(&self, world_z: f64, distance: f64, difficulty: f64) -> f64;
}

/// A renderer that draws nothing. Used headless and in tests.
#[derive(Debug, Default)]
pub struct NullVisuals {
    next_id: u64,
}

impl RemoteVisuals for NullVisuals {
    fn create(&mut self, _color: Color, _name: &str) -> VisualId {
        let id = VisualId(self.next_id);
        self.next_id += 1;
        id
    }

    fn set_transform(&mut self, _id: VisualId, _transform: Transform) {}
    fn set_visible(&mut self, _id: VisualId, _visible: bool) {}
    fn remove(&mut self, _id: VisualId) {}
}

/// A perfectly flat, straight track.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatTrack;

impl TrackSampler for FlatTrack {
    fn curve_x(&self, _world_z: f64, _distance: f64) -> f64 {
        0.0
    }

    fn curve_deriv(&self, _world_z: f64, _distance: f64) -> f64 {
        0.0
    }

    fn height_deriv(&self, _world_z: f64, _distance: f64, _difficulty: f64) -> f64 {
        0.0
    }
}
