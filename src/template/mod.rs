//! Scaled template variants and their correlation plans.

use crate::image::{Frame, Plane};
use crate::util::EngineResult;

mod plan;

pub use plan::{ChannelPlan, TemplatePlan};

/// One scale variant of a registered image.
///
/// Holds the resized color buffer, its grayscale conversion and every plan
/// the match modes need, so matching never touches the source bitmap.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaledTemplate {
    scale: f32,
    color: Frame,
    gray: Plane,
    gray_plan: TemplatePlan,
    color_plan: TemplatePlan,
    channel_plans: [ChannelPlan; 3],
}

impl ScaledTemplate {
    /// Resizes `source` by `scale` and precomputes plans.
    pub fn from_source(source: &Frame, scale: f32) -> EngineResult<Self> {
        Self::from_frame(source.resized(scale), scale)
    }

    /// Builds plans for an already resized frame.
    pub fn from_frame(color: Frame, scale: f32) -> EngineResult<Self> {
        let gray = color.gray();
        let gray_plan = TemplatePlan::from_view(gray.view())?;
        let [r, g, b] = color.channels();
        let color_plan = TemplatePlan::from_planes(&[r.view(), g.view(), b.view()])?;
        let channel_plans = [
            ChannelPlan::from_view(r.view()),
            ChannelPlan::from_view(g.view()),
            ChannelPlan::from_view(b.view()),
        ];
        Ok(Self {
            scale,
            color,
            gray,
            gray_plan,
            color_plan,
            channel_plans,
        })
    }

    /// Scale factor relative to the registered bitmap.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.gray.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.gray.height()
    }

    /// Resized color buffer.
    pub fn color(&self) -> &Frame {
        &self.color
    }

    /// Resized grayscale buffer.
    pub fn gray(&self) -> &Plane {
        &self.gray
    }

    pub(crate) fn gray_plan(&self) -> &TemplatePlan {
        &self.gray_plan
    }

    pub(crate) fn color_plan(&self) -> &TemplatePlan {
        &self.color_plan
    }

    pub(crate) fn channel_plans(&self) -> &[ChannelPlan; 3] {
        &self.channel_plans
    }
}
