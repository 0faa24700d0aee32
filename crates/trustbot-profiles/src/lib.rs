//! trustbot-profiles — the language profile registry: seed profiles for languages without
//! a parser available, on-disk persistence keyed by codebase fingerprint, and the
//! detect/sample/generate/validate/refine pipeline that produces a profile for a language
//! the seed set doesn't cover.

pub mod error;
pub mod model;
pub mod profiling;
pub mod registry;
pub mod seed;

pub use error::ProfileError;
pub use model::{BlockRuleConfig, ForwardDeclarationConfig, LanguageProfile, SpecialFileConfig};
pub use profiling::{detect_languages, generate_profile, sample_files, validate_and_refine, validate_patterns};
pub use registry::{fingerprint_files, load_cached, persist, resolve};
pub use seed::{all_seed_profiles, extension_map, seed_profile};
