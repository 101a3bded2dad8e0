use std::borrow::Cow;

/// Component/feature that originated the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSource(Cow<'static, str>);

impl EventSource {
    pub const GENERAL: Self = Self::const_str("general");
    pub const PIPELINE: Self = Self::const_str("pipeline");
    pub const STAGE: Self = Self::const_str("stage");
    pub const STORE: Self = Self::const_str("store");
    pub const SIGNING: Self = Self::const_str("signing");
    pub const PUBLISH: Self = Self::const_str("publish");

    const fn const_str(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    /// Borrow the underlying identifier used for logging/telemetry.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
