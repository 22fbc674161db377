//! gantry-trigger — the trigger evaluator.
//!
//! Given a workload definition, its declared triggers, and the definition
//! snapshot embedded in its latest materialized instance, this crate
//! answers two questions:
//!
//! - **`resolve`** — should any image-change trigger retag containers in
//!   the pod template right now (mutating the definition in place)?
//! - **`decide`** — does any trigger condition justify creating a new
//!   rollout, and with which ordered causes?
//!
//! Both are pure over their inputs apart from the injected image-stream
//! lookup; committing the outcome is the orchestrator's job.

pub mod decide;
pub mod error;
pub mod resolve;

pub use decide::{TemplateEq, decide_rollout, decide_rollout_with, default_template_eq};
pub use error::{TriggerError, TriggerResult};
pub use resolve::{ImageStream, ImageStreamLookup, StaticImageStreams, resolve_image_triggers};
