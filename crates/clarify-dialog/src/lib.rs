//! Clarifying question-answering dialogue.
//!
//! Narrows the candidate answers of a search backend down to one by asking
//! the user clarifying questions, and drives each session as an explicit
//! turn state machine.

pub mod backend;
pub mod chatter;
pub mod context;
pub mod error;
pub mod faq;
pub mod flow;
pub mod level;
pub mod narrowing;
pub mod orchestrator;
pub mod parser;
pub mod response;
pub mod transcript;
pub mod transport;
pub mod types;

pub use backend::{expand_levels, HttpBackend, SearchBackend, StaticBackend};
pub use chatter::{ChatterCatalog, SmallTalk};
pub use context::{DiscourseContext, Utterance};
pub use error::DialogError;
pub use faq::{FaqIndex, FaqLibrary, FaqMatcher};
pub use flow::{Phase, PhaseKind};
pub use level::{LevelCatalog, LevelMatcher};
pub use narrowing::{IntelligentUnit, Thresholds};
pub use orchestrator::{Collaborators, DialogSettings, Ending, Orchestrator, SessionOutcome};
pub use parser::{FeatureExtractor, RuleExtractor};
pub use response::{classify_reply, Affirmation, Phrasebook, Prompt};
pub use transcript::TranscriptLog;
pub use transport::{sanitize, ChannelTransport, Transport};
pub use types::{
    ActionKind, BackendRecord, BackendRequest, Candidate, ClientEvent, Decision, FaqMatch,
    Features, Language, ServerEvent, UtteranceType,
};
