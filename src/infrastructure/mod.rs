// Engine mechanics for Glassbox: interception and identity tracking.

pub mod intercept;
pub mod tracking;

pub use intercept::{
    Engine, EngineError, HookResult, InterceptOptions, Invoker, Matcher, Value, Wrapped,
};
pub use tracking::{Handle, ProxyState, Tracking};
