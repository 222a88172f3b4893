//! Keyframe animation clips.
//!
//! A clip is a set of channels, each driving one property of one scene node
//! through a list of timestamps and values.

use std::ops::{Add, Mul};

use cgmath::InnerSpace;

use crate::data_structures::scene_graph::NodeId;

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<cgmath::Vector3<f32>>),
    Rotation(Vec<cgmath::Quaternion<f32>>),
    Scale(Vec<cgmath::Vector3<f32>>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    /// Hermite spline; every key stores in-tangent, value and out-tangent.
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(interpolation: gltf::animation::Interpolation) -> Self {
        match interpolation {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        }
    }
}

/// A sampled property value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Translation(cgmath::Vector3<f32>),
    Rotation(cgmath::Quaternion<f32>),
    Scale(cgmath::Vector3<f32>),
}

#[derive(Clone, Debug)]
pub struct Channel {
    pub node: NodeId,
    pub interpolation: Interpolation,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

impl Channel {
    /// Value at `time`, held at the first and last key outside their range.
    /// `None` for an empty or malformed channel.
    pub fn sample(&self, time: f32) -> Option<Sample> {
        let (timestamps, interpolation) = (&self.timestamps[..], self.interpolation);
        match &self.keyframes {
            Keyframes::Translation(values) => {
                sample_track(timestamps, values, interpolation, time).map(Sample::Translation)
            }
            Keyframes::Rotation(values) => {
                sample_track(timestamps, values, interpolation, time).map(Sample::Rotation)
            }
            Keyframes::Scale(values) => {
                sample_track(timestamps, values, interpolation, time).map(Sample::Scale)
            }
        }
    }

    pub fn end_time(&self) -> f32 {
        self.timestamps.last().copied().unwrap_or(0.0)
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels.iter().map(Channel::end_time).fold(0.0, f32::max);
        Self {
            name: name.into(),
            channels,
            duration,
        }
    }
}

/// Values a track can blend between.
pub trait Interpolate: Copy + Add<Output = Self> + Mul<f32, Output = Self> {
    fn linear(from: Self, to: Self, t: f32) -> Self;

    fn normalized(self) -> Self {
        self
    }
}

impl Interpolate for cgmath::Vector3<f32> {
    fn linear(from: Self, to: Self, t: f32) -> Self {
        from + (to - from) * t
    }
}

impl Interpolate for cgmath::Quaternion<f32> {
    fn linear(from: Self, to: Self, t: f32) -> Self {
        // q and -q are the same rotation; take the short way round
        let to = if from.dot(to) < 0.0 { -to } else { to };
        from.slerp(to, t).normalize()
    }

    fn normalized(self) -> Self {
        self.normalize()
    }
}

pub fn sample_track<T: Interpolate>(
    timestamps: &[f32],
    values: &[T],
    interpolation: Interpolation,
    time: f32,
) -> Option<T> {
    let count = timestamps.len();
    let cubic = interpolation == Interpolation::CubicSpline;
    let value_at = |key: usize| -> Option<T> {
        if cubic {
            values.get(3 * key + 1).copied()
        } else {
            values.get(key).copied()
        }
    };

    if count == 0 {
        return None;
    }
    if count == 1 || time <= timestamps[0] {
        return value_at(0);
    }
    if time >= timestamps[count - 1] {
        return value_at(count - 1);
    }

    // First key strictly after `time`, in 1..count
    let next = timestamps.partition_point(|&key| key <= time);
    let prev = next - 1;
    let span = timestamps[next] - timestamps[prev];
    if span <= 0.0 {
        return value_at(next);
    }
    let t = (time - timestamps[prev]) / span;

    match interpolation {
        Interpolation::Step => value_at(prev),
        Interpolation::Linear => Some(T::linear(value_at(prev)?, value_at(next)?, t)),
        Interpolation::CubicSpline => {
            let v0 = *values.get(3 * prev + 1)?;
            let out0 = *values.get(3 * prev + 2)?;
            let in1 = *values.get(3 * next)?;
            let v1 = *values.get(3 * next + 1)?;
            let t2 = t * t;
            let t3 = t2 * t;
            let value = v0 * (2.0 * t3 - 3.0 * t2 + 1.0)
                + out0 * ((t3 - 2.0 * t2 + t) * span)
                + v1 * (-2.0 * t3 + 3.0 * t2)
                + in1 * ((t3 - t2) * span);
            Some(value.normalized())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Quaternion, Rad, Rotation3, Vector3};

    fn v(x: f32) -> Vector3<f32> {
        Vector3::new(x, 0.0, 0.0)
    }

    #[test]
    fn linear_interpolates_and_clamps() {
        let times = [1.0, 2.0, 4.0];
        let values = [v(0.0), v(10.0), v(20.0)];
        let at = |t| sample_track(&times, &values, Interpolation::Linear, t).unwrap().x;
        assert_eq!(at(0.0), 0.0);
        assert_eq!(at(1.5), 5.0);
        assert_eq!(at(2.0), 10.0);
        assert_eq!(at(3.0), 15.0);
        assert_eq!(at(9.0), 20.0);
    }

    #[test]
    fn step_holds_the_previous_key() {
        let times = [0.0, 1.0];
        let values = [v(1.0), v(2.0)];
        let at = |t| sample_track(&times, &values, Interpolation::Step, t).unwrap().x;
        assert_eq!(at(0.99), 1.0);
        assert_eq!(at(1.0), 2.0);
    }

    #[test]
    fn cubic_spline_with_flat_tangents_is_smoothstep() {
        let times = [0.0, 2.0];
        let zero = v(0.0);
        let values = [zero, v(0.0), zero, zero, v(1.0), zero];
        let at = |t| sample_track(&times, &values, Interpolation::CubicSpline, t).unwrap().x;
        assert_eq!(at(-1.0), 0.0);
        assert!((at(1.0) - 0.5).abs() < 1e-6);
        assert!((at(0.5) - 0.15625).abs() < 1e-6);
        assert_eq!(at(5.0), 1.0);
    }

    #[test]
    fn cubic_spline_follows_tangents() {
        // value 0 -> 0 with out-tangent 1: the curve rises first
        let times = [0.0, 1.0];
        let values = [v(0.0), v(0.0), v(1.0), v(0.0), v(0.0), v(0.0)];
        let mid = sample_track(&times, &values, Interpolation::CubicSpline, 0.5).unwrap();
        assert!((mid.x - 0.125).abs() < 1e-6);
    }

    #[test]
    fn rotations_take_the_short_arc() {
        let a = Quaternion::from_angle_y(Rad(0.1));
        let b = -Quaternion::from_angle_y(Rad(0.3));
        let mid = sample_track(&[0.0, 1.0], &[a, b], Interpolation::Linear, 0.5).unwrap();
        let expected = Quaternion::from_angle_y(Rad(0.2));
        assert!(mid.dot(expected).abs() > 0.9999);
        assert!((mid.magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn malformed_tracks_sample_to_none() {
        let empty: [Vector3<f32>; 0] = [];
        assert!(sample_track(&[], &empty, Interpolation::Linear, 0.0).is_none());
        assert!(sample_track(&[0.0, 1.0], &[v(1.0)], Interpolation::Linear, 0.5).is_none());
    }

    #[test]
    fn clip_duration_is_the_latest_key() {
        let clip = AnimationClip::new(
            "walk",
            vec![
                Channel {
                    node: 0,
                    interpolation: Interpolation::Linear,
                    timestamps: vec![0.0, 1.5],
                    keyframes: Keyframes::Translation(vec![v(0.0), v(1.0)]),
                },
                Channel {
                    node: 1,
                    interpolation: Interpolation::Step,
                    timestamps: vec![0.0, 2.25],
                    keyframes: Keyframes::Scale(vec![v(1.0), v(2.0)]),
                },
            ],
        );
        assert_eq!(clip.duration, 2.25);
        assert_eq!(clip.channels[1].sample(3.0), Some(Sample::Scale(v(2.0))));
    }
}
