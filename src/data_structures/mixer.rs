//! Animation mixer: plays clips on a scene graph.
//!
//! Each clip is driven by a [`ClipAction`] that owns its own time, speed,
//! weight and loop behaviour. Every update the mixer advances the running
//! actions, samples their channels and writes the weighted blend into the
//! local transforms of the targeted nodes.

use std::collections::BTreeMap;

use crate::{
    data_structures::scene_graph::{NodeId, SceneGraph},
    resources::animation::{AnimationClip, Interpolate, Sample},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Plays once and finishes at the end.
    Once,
    /// Wraps back to the start.
    #[default]
    Repeat,
    /// Alternates forward and backward passes.
    PingPong,
}

#[derive(Clone, Debug)]
pub struct ClipAction {
    /// Index of the clip in the clip list handed to [`AnimationMixer::update`].
    pub clip: usize,
    /// Position within the current pass, in `0..=duration`.
    pub time: f32,
    pub time_scale: f32,
    pub weight: f32,
    pub loop_mode: LoopMode,
    /// Number of passes before finishing; `None` loops forever.
    pub repetitions: Option<u32>,
    /// Hold the last frame after finishing instead of releasing the pose.
    pub clamp_when_finished: bool,
    enabled: bool,
    paused: bool,
    loop_count: u32,
}

impl ClipAction {
    pub fn new(clip: usize) -> Self {
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            weight: 1.0,
            loop_mode: LoopMode::default(),
            repetitions: None,
            clamp_when_finished: false,
            enabled: false,
            paused: false,
            loop_count: 0,
        }
    }

    pub fn play(&mut self) -> &mut Self {
        self.enabled = true;
        self.paused = false;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.enabled = false;
        self.reset()
    }

    pub fn reset(&mut self) -> &mut Self {
        self.time = 0.0;
        self.loop_count = 0;
        self.paused = false;
        self
    }

    pub fn set_loop(&mut self, loop_mode: LoopMode, repetitions: Option<u32>) -> &mut Self {
        self.loop_mode = loop_mode;
        self.repetitions = repetitions;
        self
    }

    pub fn is_running(&self) -> bool {
        self.enabled && !self.paused && self.time_scale != 0.0
    }

    /// Whether the action contributes to the pose.
    pub fn is_active(&self) -> bool {
        self.enabled && self.weight > 0.0
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Time to sample the clip at, accounting for backward ping-pong passes.
    pub fn sample_time(&self, duration: f32) -> f32 {
        if self.loop_mode == LoopMode::PingPong && self.loop_count % 2 == 1 {
            duration - self.time
        } else {
            self.time
        }
    }

    fn advance(&mut self, delta: f32, duration: f32) {
        if !self.is_running() {
            return;
        }
        if duration <= 0.0 {
            self.time = 0.0;
            return;
        }
        self.time += delta * self.time_scale;

        match self.loop_mode {
            LoopMode::Once => {
                if self.time >= duration {
                    self.time = duration;
                    self.finish();
                } else if self.time < 0.0 {
                    self.time = 0.0;
                    self.finish();
                }
            }
            LoopMode::Repeat | LoopMode::PingPong => {
                if self.time >= duration || self.time < 0.0 {
                    let passes = (self.time / duration).floor();
                    self.time -= passes * duration;
                    self.loop_count = self.loop_count.saturating_add(passes.abs() as u32);
                    if let Some(repetitions) = self.repetitions {
                        if self.loop_count >= repetitions.max(1) {
                            // Hold the end of the final pass
                            self.loop_count = repetitions.max(1) - 1;
                            self.time = if self.time_scale > 0.0 { duration } else { 0.0 };
                            self.finish();
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.clamp_when_finished {
            self.paused = true;
        } else {
            self.enabled = false;
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimationMixer {
    pub actions: Vec<ClipAction>,
    /// Global time in seconds, scaled by `time_scale`.
    pub time: f32,
    pub time_scale: f32,
}

impl Default for AnimationMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            time: 0.0,
            time_scale: 1.0,
        }
    }

    /// The action for `clip`, created stopped on first use.
    pub fn clip_action(&mut self, clip: usize) -> &mut ClipAction {
        let idx = match self.actions.iter().position(|action| action.clip == clip) {
            Some(idx) => idx,
            None => {
                self.actions.push(ClipAction::new(clip));
                self.actions.len() - 1
            }
        };
        &mut self.actions[idx]
    }

    pub fn stop_all_action(&mut self) {
        for action in self.actions.iter_mut() {
            action.stop();
        }
    }

    /// Advances all actions by `delta` seconds and poses `graph`.
    pub fn update(&mut self, delta: f32, clips: &[AnimationClip], graph: &mut SceneGraph) {
        let delta = delta * self.time_scale;
        self.time += delta;

        let mut poses: BTreeMap<NodeId, NodePose> = BTreeMap::new();
        for action in self.actions.iter_mut() {
            let Some(clip) = clips.get(action.clip) else {
                log::warn!("action refers to missing clip {}", action.clip);
                continue;
            };
            action.advance(delta, clip.duration);
            if !action.is_active() {
                continue;
            }
            let time = action.sample_time(clip.duration);
            for channel in &clip.channels {
                if channel.node >= graph.len() {
                    continue;
                }
                if let Some(sample) = channel.sample(time) {
                    poses
                        .entry(channel.node)
                        .or_default()
                        .accumulate(sample, action.weight);
                }
            }
        }

        for (node, pose) in poses {
            let node = &mut graph.nodes[node];
            if let Some(translation) = pose.translation {
                node.local.position = translation.resolve(node.rest.position);
            }
            if let Some(rotation) = pose.rotation {
                node.local.rotation = rotation.resolve(node.rest.rotation);
            }
            if let Some(scale) = pose.scale {
                node.local.scale = scale.resolve(node.rest.scale);
            }
        }
    }
}

/// Weighted running blend of one property.
#[derive(Clone, Copy, Debug)]
struct Accumulator<T> {
    value: T,
    weight: f32,
}

impl<T: Interpolate> Accumulator<T> {
    fn add(slot: &mut Option<Self>, value: T, weight: f32) {
        match slot {
            None => *slot = Some(Self { value, weight }),
            Some(acc) => {
                acc.weight += weight;
                acc.value = T::linear(acc.value, value, weight / acc.weight);
            }
        }
    }

    /// Fills up a total weight below one with the rest value.
    fn resolve(self, rest: T) -> T {
        if self.weight < 1.0 {
            T::linear(self.value, rest, 1.0 - self.weight)
        } else {
            self.value
        }
    }
}

#[derive(Debug, Default)]
struct NodePose {
    translation: Option<Accumulator<cgmath::Vector3<f32>>>,
    rotation: Option<Accumulator<cgmath::Quaternion<f32>>>,
    scale: Option<Accumulator<cgmath::Vector3<f32>>>,
}

impl NodePose {
    fn accumulate(&mut self, sample: Sample, weight: f32) {
        match sample {
            Sample::Translation(value) => Accumulator::add(&mut self.translation, value, weight),
            Sample::Rotation(value) => Accumulator::add(&mut self.rotation, value, weight),
            Sample::Scale(value) => Accumulator::add(&mut self.scale, value, weight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{instance::Instance, scene_graph::SceneNode},
        resources::animation::{Channel, Interpolation, Keyframes},
    };
    use cgmath::Vector3;

    fn slide(node: NodeId, from: f32, to: f32) -> AnimationClip {
        AnimationClip::new(
            "slide",
            vec![Channel {
                node,
                interpolation: Interpolation::Linear,
                timestamps: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![
                    Vector3::new(from, 0.0, 0.0),
                    Vector3::new(to, 0.0, 0.0),
                ]),
            }],
        )
    }

    fn graph() -> SceneGraph {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(SceneNode::new(
            "root",
            Instance::new().with_position([0.0, 7.0, 0.0]),
        ));
        graph.add_root(root);
        graph
    }

    fn x(graph: &SceneGraph) -> f32 {
        graph.nodes[0].local.position.x
    }

    #[test]
    fn unplayed_actions_leave_the_pose_alone() {
        let clips = [slide(0, 0.0, 10.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(0);
        mixer.update(0.5, &clips, &mut graph);
        assert_eq!(x(&graph), 0.0);
        assert_eq!(graph.nodes[0].local.position.y, 7.0);
    }

    #[test]
    fn repeat_wraps_around() {
        let clips = [slide(0, 0.0, 10.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(0).play();

        mixer.update(0.25, &clips, &mut graph);
        assert!((x(&graph) - 2.5).abs() < 1e-5);
        mixer.update(1.0, &clips, &mut graph);
        assert!((x(&graph) - 2.5).abs() < 1e-5);
        assert_eq!(mixer.actions[0].loop_count(), 1);
        // The channel drives the whole translation, not just x
        assert_eq!(graph.nodes[0].local.position.y, 0.0);
        assert_eq!(graph.nodes[0].local.scale, Vector3::new(1.0, 1.0, 1.0));
        assert!(mixer.actions[0].is_running());
    }

    #[test]
    fn once_finishes_and_releases_unless_clamped() {
        let clips = [slide(0, 0.0, 10.0)];

        let mut graph_released = graph();
        let mut released = AnimationMixer::new();
        released.clip_action(0).set_loop(LoopMode::Once, None).play();
        released.update(2.0, &clips, &mut graph_released);
        assert!(!released.actions[0].is_running());
        assert!(!released.actions[0].is_active());

        let mut graph_clamped = graph();
        let mut clamped = AnimationMixer::new();
        let action = clamped.clip_action(0);
        action.set_loop(LoopMode::Once, None).play();
        action.clamp_when_finished = true;
        clamped.update(2.0, &clips, &mut graph_clamped);
        assert!(!clamped.actions[0].is_running());
        assert!(clamped.actions[0].is_active());
        assert_eq!(x(&graph_clamped), 10.0);
    }

    #[test]
    fn ping_pong_plays_backwards_on_odd_passes() {
        let clips = [slide(0, 0.0, 10.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(0).set_loop(LoopMode::PingPong, None).play();
        mixer.update(1.25, &clips, &mut graph);
        assert!((x(&graph) - 7.5).abs() < 1e-5);
        mixer.update(1.0, &clips, &mut graph);
        assert!((x(&graph) - 2.5).abs() < 1e-5);
    }

    #[test]
    fn limited_repetitions_hold_the_end() {
        let clips = [slide(0, 0.0, 10.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        let action = mixer.clip_action(0);
        action.set_loop(LoopMode::Repeat, Some(2)).play();
        action.clamp_when_finished = true;
        mixer.update(5.0, &clips, &mut graph);
        assert_eq!(x(&graph), 10.0);
        assert!(!mixer.actions[0].is_running());
    }

    #[test]
    fn partial_weight_blends_with_the_rest_pose() {
        let clips = [slide(0, 10.0, 10.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        let action = mixer.clip_action(0);
        action.weight = 0.25;
        action.play();
        mixer.update(0.1, &clips, &mut graph);
        assert!((x(&graph) - 2.5).abs() < 1e-5);
        assert!((graph.nodes[0].local.position.y - 5.25).abs() < 1e-5);
    }

    #[test]
    fn two_actions_average_by_weight() {
        let clips = [slide(0, 2.0, 2.0), slide(0, 6.0, 6.0)];
        let mut graph = graph();
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(0).play();
        mixer.clip_action(1).play();
        mixer.update(0.1, &clips, &mut graph);
        assert!((x(&graph) - 4.0).abs() < 1e-5);

        mixer.stop_all_action();
        assert!(mixer.actions.iter().all(|action| !action.is_running()));
    }

    #[test]
    fn clip_action_is_reused() {
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(3).time_scale = 2.0;
        assert_eq!(mixer.clip_action(3).time_scale, 2.0);
        assert_eq!(mixer.actions.len(), 1);
    }
}
