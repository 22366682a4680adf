//! Conversation orchestrator: the per-session turn state machine.
//!
//! One [`Orchestrator`] drives one session. It reads utterances from its
//! [`Transport`], keeps the [`DiscourseContext`] and the [`IntelligentUnit`]
//! of the current question, and walks the phases in [`crate::flow`] until
//! the user is done or disconnects.

use std::path::Path;
use std::sync::Arc;

use clarify_core::config::{ClarifyConfig, DialogConfig};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{self, expand_levels, SearchBackend};
use crate::chatter::{ChatterCatalog, SmallTalk};
use crate::context::DiscourseContext;
use crate::error::DialogError;
use crate::faq::{FaqLibrary, FaqMatcher};
use crate::flow::{invariant_violated, validate_transition, Phase, PhaseKind};
use crate::narrowing::{IntelligentUnit, Thresholds};
use crate::parser::{FeatureExtractor, RuleExtractor};
use crate::response::{classify_reply, Affirmation, LevelKind, Phrasebook, Prompt};
use crate::transcript::TranscriptLog;
use crate::transport::{sanitize, Transport};
use crate::types::{ActionKind, BackendRecord, BackendRequest, Candidate, ClientEvent, Language, ServerEvent};

/// Steps the dispatch loop may take without reading input before the
/// conversation is considered stuck. Every clarification branch reads
/// input, so a session that exceeds this can never terminate.
const MAX_STEPS_WITHOUT_INPUT: usize = 32;

/// The external collaborators a session talks to. Shared by all sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn FeatureExtractor>,
    pub faq: Arc<dyn FaqMatcher>,
    pub small_talk: Arc<dyn SmallTalk>,
    pub backend: Arc<dyn SearchBackend>,
}

impl Collaborators {
    /// Build the built-in collaborators from configuration.
    pub fn from_config(config: &ClarifyConfig) -> Result<Self, DialogError> {
        let extractor = RuleExtractor::from_config(&config.levels)?;
        let faq = FaqLibrary::from_config(&config.faq)?;
        let small_talk = ChatterCatalog::from_config(&config.chatter, &config.dialog.bot_name)?;
        let backend = backend::from_config(&config.backend)?;
        info!(backend = %config.backend.kind, "Collaborators ready");
        Ok(Self {
            extractor: Arc::new(extractor),
            faq: Arc::new(faq),
            small_talk: Arc::new(small_talk),
            backend,
        })
    }
}

/// Per-session dialogue settings.
#[derive(Debug, Clone)]
pub struct DialogSettings {
    pub thresholds: Thresholds,
    /// Level committed when the user names neither a study nor a faculty.
    pub broad_level: String,
    pub default_language: Language,
    pub phrasebook: Phrasebook,
}

impl DialogSettings {
    pub fn from_config(config: &DialogConfig) -> Self {
        let default_language = Language::from_config_name(&config.default_language)
            .unwrap_or_else(|| {
                warn!(
                    language = %config.default_language,
                    "Unknown default language, using English"
                );
                Language::English
            });
        Self {
            thresholds: Thresholds::from(config),
            broad_level: config.broad_level.clone(),
            default_language,
            phrasebook: Phrasebook::new(config.bot_name.clone()),
        }
    }
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self::from_config(&DialogConfig::default())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user said goodbye.
    Finished,
    /// The transport closed mid-conversation.
    Disconnected,
}

/// Result of the end-of-conversation sub-dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Finished,
    NewQuestion,
    /// The offered answer did not resolve the question.
    Unresolved,
}

/// The transport closed while waiting for the user.
#[derive(Debug)]
struct Hangup;

type Step<T = Phase> = Result<T, Hangup>;

/// Drives one conversation session.
pub struct Orchestrator<T: Transport> {
    id: Uuid,
    transport: T,
    collaborators: Collaborators,
    settings: DialogSettings,
    language: Language,
    context: Option<DiscourseContext>,
    unit: IntelligentUnit,
    /// Newest sanitised message from the user, whatever phase read it.
    last_input: Option<String>,
    trace: Vec<PhaseKind>,
    steps_without_input: usize,
    transcript: Option<TranscriptLog>,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(id: Uuid, transport: T, collaborators: Collaborators, settings: DialogSettings) -> Self {
        Self {
            id,
            transport,
            collaborators,
            language: settings.default_language,
            unit: IntelligentUnit::new(settings.thresholds),
            settings,
            context: None,
            last_input: None,
            trace: Vec::new(),
            steps_without_input: 0,
            transcript: None,
        }
    }

    /// Record the conversation to a transcript file in `dir`.
    ///
    /// A transcript that cannot be created is logged and skipped.
    pub fn with_transcript(mut self, dir: &Path, min_lines: usize) -> Self {
        match TranscriptLog::create(dir, self.language, min_lines) {
            Ok(log) => self.transcript = Some(log),
            Err(e) => warn!(session = %self.id, error = %e, "Transcript disabled"),
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Context of the current question, once one has been asked.
    pub fn context(&self) -> Option<&DiscourseContext> {
        self.context.as_ref()
    }

    pub fn unit(&self) -> &IntelligentUnit {
        &self.unit
    }

    /// Phases visited so far, in order.
    pub fn trace(&self) -> &[PhaseKind] {
        &self.trace
    }

    /// Run the conversation until the user is done or the transport closes.
    ///
    /// # Panics
    ///
    /// On an orchestration invariant violation: an illegal phase edge, a
    /// broken decision precondition, or a loop that stops reading input.
    pub async fn run(&mut self) -> SessionOutcome {
        info!(session = %self.id, language = %self.language, "Session started");
        self.say(Prompt::Greeting).await;

        let mut phase = Phase::AwaitInput { keep_state: false };
        self.trace.push(phase.kind());

        let outcome = loop {
            if phase == Phase::Done {
                break SessionOutcome::Finished;
            }
            let next = match self.step(phase).await {
                Ok(next) => next,
                Err(Hangup) => break SessionOutcome::Disconnected,
            };
            self.enter(phase.kind(), next.kind());
            phase = next;
        };

        if let Some(log) = self.transcript.take() {
            match log.close() {
                Ok(kept) => debug!(session = %self.id, kept, "Transcript closed"),
                Err(e) => warn!(session = %self.id, error = %e, "Failed to close transcript"),
            }
        }
        info!(session = %self.id, outcome = ?outcome, steps = self.trace.len(), "Session ended");
        outcome
    }

    /// Dispatch-boundary checks for the step `from` -> `to`.
    fn enter(&mut self, from: PhaseKind, to: PhaseKind) {
        if let Err(e) = validate_transition(from, to) {
            invariant_violated(e);
        }
        self.steps_without_input += 1;
        if self.steps_without_input > MAX_STEPS_WITHOUT_INPUT {
            invariant_violated(format!(
                "{} steps without reading input, last phase {to}",
                self.steps_without_input
            ));
        }
        debug!(session = %self.id, %from, %to, "Phase transition");
        self.trace.push(to);
    }

    async fn step(&mut self, phase: Phase) -> Step {
        match phase {
            Phase::AwaitInput { keep_state } => self.await_input(keep_state).await,
            Phase::Chatter => self.chatter().await,
            Phase::FaqCheck => self.faq_check().await,
            Phase::BackendQuery => self.backend_query().await,
            Phase::ViabilityCheck { came_from_back } => self.viability_check(came_from_back).await,
            Phase::IuChoice => self.iu_choice().await,
            Phase::Done => invariant_violated("step on a finished conversation"),
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn await_input(&mut self, keep_state: bool) -> Step {
        let text = self.listen().await?;
        let features = self.collaborators.extractor.extract(&text, self.language);

        match self.context.as_mut() {
            Some(context) if keep_state => context.add_rephrase(text, features),
            _ => {
                self.context = Some(DiscourseContext::new(text, features));
                self.unit = IntelligentUnit::new(self.settings.thresholds);
            }
        }

        self.language = self.current().language();
        let context = self.current();
        debug!(
            session = %self.id,
            keywords = ?context.keywords(),
            level = context.level().unwrap_or(""),
            keep_state,
            "Utterance processed"
        );
        Ok(Phase::Chatter)
    }

    async fn chatter(&mut self) -> Step {
        let reply = {
            let context = self.current();
            let Some(newest) = context.last_utterance() else {
                invariant_violated("discourse context without utterances");
            };
            if self.last_input.as_deref() != Some(newest.text.as_str()) {
                return Ok(Phase::FaqCheck);
            }
            let small_talk = &self.collaborators.small_talk;
            small_talk
                .reply(context.keywords(), &newest.text, context.language())
                .or_else(|| small_talk.reply(&newest.features.keywords, &newest.text, context.language()))
                .map(|reply| (reply, newest.features.keywords.clone()))
        };

        match reply {
            Some((reply, matched)) => {
                debug!(session = %self.id, "Small talk answered");
                self.send_text(reply).await;
                self.current_mut().remove_keywords(&matched);
                Ok(Phase::AwaitInput { keep_state: true })
            }
            None => Ok(Phase::FaqCheck),
        }
    }

    async fn faq_check(&mut self) -> Step {
        let found = {
            let context = self.current();
            if context.keywords().len() < 2 {
                return Ok(Phase::BackendQuery);
            }
            self.collaborators
                .faq
                .best_match(context.keywords(), context.language(), context.offered_faqs())
        };
        let Some(faq) = found else {
            return Ok(Phase::BackendQuery);
        };

        info!(session = %self.id, question = %faq.question, "Offering FAQ entry");
        self.current_mut().mark_faq_offered(faq.question.clone());
        let question = self.settings.phrasebook.confirm(self.language, Some(&faq.question));
        if !self.ask_yes_no(question).await?.is_yes() {
            return Ok(Phase::BackendQuery);
        }
        self.send_text(faq.answer).await;
        Ok(match self.end_conversation().await? {
            Ending::Finished => Phase::Done,
            Ending::NewQuestion => Phase::AwaitInput { keep_state: false },
            Ending::Unresolved => Phase::BackendQuery,
        })
    }

    async fn backend_query(&mut self) -> Step {
        let request = self.current().backend_request();
        let records = self.query_backend(&request).await;
        let batch = expand_levels(records);
        debug!(session = %self.id, batch = batch.len(), "Merging backend results");
        self.unit.merge_candidates(batch);
        Ok(Phase::ViabilityCheck {
            came_from_back: false,
        })
    }

    async fn viability_check(&mut self, came_from_back: bool) -> Step {
        let Some(winner) = self.unit.winner().cloned() else {
            return Ok(if came_from_back {
                Phase::Chatter
            } else {
                Phase::IuChoice
            });
        };

        info!(session = %self.id, url = %winner.url, score = winner.score, "Offering winner");
        Ok(match self.offer(&winner.url, &winner.answer).await? {
            Ending::Finished => Phase::Done,
            Ending::NewQuestion => Phase::AwaitInput { keep_state: false },
            Ending::Unresolved => {
                self.unit.reject_url(&winner.url);
                if came_from_back {
                    Phase::ViabilityCheck {
                        came_from_back: true,
                    }
                } else {
                    Phase::IuChoice
                }
            }
        })
    }

    async fn iu_choice(&mut self) -> Step {
        let active = self.current().keywords().clone();
        let decision = self.unit.decide(&active);
        info!(session = %self.id, action = ?decision.action, keyword = decision.keyword.as_deref().unwrap_or(""), "Clarifying");

        match decision.action {
            ActionKind::ConfirmLevel => {
                if let Some(level) = self.unit.confirmed_level() {
                    invariant_violated(format!("ConfirmLevel chosen with level {level} confirmed"));
                }
                self.confirm_level().await
            }
            ActionKind::ConfirmKeyword => {
                let Some(keyword) = decision.keyword else {
                    invariant_violated("ConfirmKeyword chosen without a keyword");
                };
                if self.unit.is_keyword_confirmed(&keyword) {
                    invariant_violated(format!("ConfirmKeyword chosen for confirmed {keyword}"));
                }
                self.confirm_keyword(keyword).await
            }
            ActionKind::ExtendKeyword => self.extend_keyword().await,
            ActionKind::Rephrase => {
                self.say(Prompt::Rephrase).await;
                Ok(Phase::AwaitInput { keep_state: true })
            }
            ActionKind::OtherMeasures => self.other_measures().await,
        }
    }

    // =========================================================================
    // Clarification branches
    // =========================================================================

    async fn confirm_level(&mut self) -> Step {
        let guess = self.current().level().map(str::to_string);
        if let Some(guess) = guess {
            let question = self.settings.phrasebook.confirm(self.language, Some(&guess));
            if self.ask_yes_no(question).await?.is_yes() {
                self.unit.confirm_level(&guess);
                return Ok(Phase::ViabilityCheck {
                    came_from_back: true,
                });
            }
        }

        let mut level = None;
        for kind in [LevelKind::Study, LevelKind::Faculty] {
            let question = self.settings.phrasebook.confirm_level_kind(self.language, kind);
            if self.ask_yes_no(question).await?.is_yes() {
                level = Some(self.ask_level_name(kind).await?);
                break;
            }
        }
        let level = level.unwrap_or_else(|| self.settings.broad_level.clone());

        info!(session = %self.id, level = %level, "Level confirmed");
        self.current_mut().set_level(level.clone());
        self.unit.confirm_level(&level);
        Ok(Phase::ViabilityCheck {
            came_from_back: true,
        })
    }

    /// Prompt for a study or faculty name until the extractor recognises one.
    async fn ask_level_name(&mut self, kind: LevelKind) -> Step<String> {
        let prompt = self.settings.phrasebook.level_prompt(self.language, kind);
        self.send_text(prompt).await;
        loop {
            let text = self.listen().await?;
            let features = self.collaborators.extractor.extract(&text, self.language);
            if let Some(level) = features.level_guess {
                return Ok(level);
            }
            self.say(Prompt::Repeat).await;
        }
    }

    async fn confirm_keyword(&mut self, keyword: String) -> Step {
        let question = self.settings.phrasebook.confirm(self.language, Some(&keyword));
        if self.ask_yes_no(question).await?.is_yes() {
            self.unit.confirm_keyword(&keyword);
            return Ok(Phase::Chatter);
        }
        self.unit.reject_keyword(&keyword);
        self.current_mut().remove_keyword(&keyword);
        Ok(Phase::ViabilityCheck {
            came_from_back: true,
        })
    }

    async fn extend_keyword(&mut self) -> Step {
        self.say(Prompt::Keyword).await;
        let keyword = loop {
            let reply = self.listen().await?.to_lowercase();
            let reply = reply.trim();
            if !reply.is_empty() && !reply.contains(char::is_whitespace) {
                break reply.to_string();
            }
            self.say(Prompt::WrongKeyword).await;
        };

        self.unit.confirm_keyword(&keyword);
        if self.current().keywords().contains(&keyword) {
            return Ok(Phase::IuChoice);
        }
        self.current_mut().add_keyword(keyword);
        Ok(Phase::Chatter)
    }

    /// Last resort: the top candidate, then every fresh backend result, then
    /// a full reset.
    async fn other_measures(&mut self) -> Step {
        if let Some(top) = self.unit.top_candidate().cloned() {
            if let Some(next) = self.offer_or_reject(&top).await? {
                return Ok(next);
            }
        }

        let request = self.current().backend_request();
        for record in self.query_backend(&request).await {
            if self.unit.is_rejected(&record.url) {
                continue;
            }
            let candidate = Candidate::new(record.url, record.score).with_answer(record.answer);
            if let Some(next) = self.offer_or_reject(&candidate).await? {
                return Ok(next);
            }
        }

        info!(session = %self.id, "Nothing accepted, starting over");
        self.say(Prompt::Rephrase).await;
        Ok(Phase::AwaitInput { keep_state: false })
    }

    /// Offer `candidate`; on rejection remember it and return `None`.
    async fn offer_or_reject(&mut self, candidate: &Candidate) -> Step<Option<Phase>> {
        Ok(match self.offer(&candidate.url, &candidate.answer).await? {
            Ending::Finished => Some(Phase::Done),
            Ending::NewQuestion => Some(Phase::AwaitInput { keep_state: false }),
            Ending::Unresolved => {
                self.unit.reject_url(&candidate.url);
                None
            }
        })
    }

    // =========================================================================
    // Sub-dialogues
    // =========================================================================

    async fn offer(&mut self, url: &str, answer: &str) -> Step<Ending> {
        for message in self.settings.phrasebook.link_and_answer(self.language, url, answer) {
            self.send_text(message).await;
        }
        self.end_conversation().await
    }

    async fn end_conversation(&mut self) -> Step<Ending> {
        let question = self.settings.phrasebook.confirm(self.language, None);
        if !self.ask_yes_no(question).await?.is_yes() {
            return Ok(Ending::Unresolved);
        }

        self.say(Prompt::AnotherQuestion).await;
        match self.listen_reply().await? {
            Affirmation::No => {
                self.say(Prompt::Closing).await;
                Ok(Ending::Finished)
            }
            Affirmation::Yes => {
                self.say(Prompt::NewQuestion).await;
                Ok(Ending::NewQuestion)
            }
            // Straight back to listening, without the new-question prompt.
            Affirmation::Unclear => Ok(Ending::NewQuestion),
        }
    }

    async fn query_backend(&mut self, request: &BackendRequest) -> Vec<BackendRecord> {
        self.say(Prompt::Searching).await;
        match self.collaborators.backend.query(request).await {
            Ok(records) => {
                debug!(session = %self.id, records = records.len(), "Backend answered");
                records
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Backend unavailable");
                self.say(Prompt::ServiceDown).await;
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Wait for the next utterance, handling language switches on the way.
    async fn listen(&mut self) -> Step<String> {
        loop {
            let raw = match self.transport.receive().await {
                None => return Err(Hangup),
                Some(ClientEvent::Language(language)) => {
                    self.switch_language(language).await;
                    continue;
                }
                Some(ClientEvent::Utterance(raw)) => raw,
            };

            let clean = sanitize(&raw);
            self.record(|log| log.user(&clean.text));
            self.transport.send(ServerEvent::Echo(clean.text.clone())).await;
            if clean.tampered {
                warn!(session = %self.id, "Markup stripped from input");
                self.say(Prompt::Fool).await;
            }
            if clean.text.is_empty() {
                self.say(Prompt::Repeat).await;
                continue;
            }
            self.steps_without_input = 0;
            self.last_input = Some(clean.text.clone());
            return Ok(clean.text);
        }
    }

    async fn listen_reply(&mut self) -> Step<Affirmation> {
        let reply = classify_reply(&self.listen().await?);
        if reply.contradictory {
            self.say(Prompt::Fool).await;
        }
        Ok(reply.affirmation)
    }

    async fn ask_yes_no(&mut self, question: String) -> Step<Affirmation> {
        self.send_text(question).await;
        self.listen_reply().await
    }

    async fn switch_language(&mut self, language: Language) {
        info!(session = %self.id, language = %language, "Language switched");
        self.language = language;
        if let Some(context) = self.context.as_mut() {
            context.set_language(language);
        }
        self.transport.send(ServerEvent::Language(language)).await;
        self.say(Prompt::LanguageSwitched).await;
    }

    async fn say(&mut self, prompt: Prompt) {
        let text = self.settings.phrasebook.phrase(self.language, prompt);
        self.send_text(text).await;
    }

    async fn send_text(&mut self, text: String) {
        self.record(|log| log.bot(&text));
        self.transport.send(ServerEvent::Message(text)).await;
    }

    fn record(&mut self, write: impl FnOnce(&mut TranscriptLog) -> Result<(), DialogError>) {
        if let Some(log) = self.transcript.as_mut() {
            if let Err(e) = write(log) {
                warn!(session = %self.id, error = %e, "Transcript write failed");
            }
        }
    }

    fn current(&self) -> &DiscourseContext {
        match self.context.as_ref() {
            Some(context) => context,
            None => invariant_violated("no discourse context before the first utterance"),
        }
    }

    fn current_mut(&mut self) -> &mut DiscourseContext {
        match self.context.as_mut() {
            Some(context) => context,
            None => invariant_violated("no discourse context before the first utterance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use clarify_core::config::LevelConfig;

    use crate::faq::FaqIndex;
    use crate::level::{LevelCatalog, LevelMatcher};
    use crate::transport::ChannelTransport;

    // ---- Fixtures ----

    /// Returns the same records for every request and counts the calls.
    struct FixedBackend {
        records: Vec<BackendRecord>,
        calls: Mutex<usize>,
    }

    impl FixedBackend {
        fn new(records: Vec<BackendRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SearchBackend for FixedBackend {
        async fn query(&self, _request: &BackendRequest) -> Result<Vec<BackendRecord>, DialogError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.records.clone())
        }
    }

    struct DownBackend;

    #[async_trait]
    impl SearchBackend for DownBackend {
        async fn query(&self, _request: &BackendRequest) -> Result<Vec<BackendRecord>, DialogError> {
            Err(DialogError::BackendUnavailable("connection refused".to_string()))
        }
    }

    fn record(url: &str, score: f64, levels: &[&str], keywords: &[&str]) -> BackendRecord {
        BackendRecord {
            url: url.to_string(),
            score,
            levels: levels.iter().map(|l| l.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            answer: format!("Answer from {url}"),
        }
    }

    fn collaborators(backend: Arc<dyn SearchBackend>) -> Collaborators {
        Collaborators {
            extractor: Arc::new(RuleExtractor::default()),
            faq: Arc::new(FaqLibrary::default()),
            small_talk: Arc::new(ChatterCatalog::builtin("Clarify", &[])),
            backend,
        }
    }

    struct Session {
        orchestrator: Orchestrator<ChannelTransport>,
        outcome: SessionOutcome,
        events: Vec<ServerEvent>,
    }

    impl Session {
        fn messages(&self) -> Vec<&str> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    ServerEvent::Message(m) => Some(m.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn said_any(&self, language: Language, prompt: Prompt) -> bool {
            let options = crate::response::variants(language, prompt);
            self.messages()
                .iter()
                .any(|m| options.iter().any(|o| o.replace("{name}", "Clarify") == *m))
        }
    }

    /// Feed `inputs` to a fresh session, then hang up and collect the output.
    async fn run_script(collaborators: Collaborators, settings: DialogSettings, inputs: &[ClientEvent]) -> Session {
        let (transport, to_session, mut from_session) = ChannelTransport::pair(1024);
        for input in inputs {
            to_session.send(input.clone()).await.unwrap();
        }
        drop(to_session);

        let mut orchestrator = Orchestrator::new(Uuid::new_v4(), transport, collaborators, settings);
        let outcome = orchestrator.run().await;

        let mut events = Vec::new();
        while let Ok(event) = from_session.try_recv() {
            events.push(event);
        }
        Session {
            orchestrator,
            outcome,
            events,
        }
    }

    fn says(texts: &[&str]) -> Vec<ClientEvent> {
        texts
            .iter()
            .map(|t| ClientEvent::Utterance(t.to_string()))
            .collect()
    }

    // ---- Main line ----

    #[tokio::test]
    async fn test_single_winner_answered_and_finished() {
        let backend = FixedBackend::new(vec![record(
            "https://uni.example/thesis-deadline.html",
            0.9,
            &[],
            &["thesis"],
        )]);
        let session = run_script(
            collaborators(backend.clone()),
            DialogSettings::default(),
            &says(&["when is the thesis deadline", "yes", "no"]),
        )
        .await;

        assert_eq!(session.outcome, SessionOutcome::Finished);
        assert_eq!(
            session.orchestrator.trace(),
            &[
                PhaseKind::AwaitInput,
                PhaseKind::Chatter,
                PhaseKind::FaqCheck,
                PhaseKind::BackendQuery,
                PhaseKind::ViabilityCheck,
                PhaseKind::Done,
            ]
        );
        assert_eq!(backend.calls(), 1);
        assert!(session
            .messages()
            .contains(&"<i><p>Answer from https://uni.example/thesis-deadline.html</p></i>"));
        assert!(session.said_any(Language::English, Prompt::Greeting));
        assert!(session.said_any(Language::English, Prompt::Closing));
    }

    #[tokio::test]
    async fn test_input_is_echoed_sanitised() {
        let session = run_script(
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
            &says(&["what's up"]),
        )
        .await;
        assert!(session
            .events
            .contains(&ServerEvent::Echo("what s up".to_string())));
    }

    #[tokio::test]
    async fn test_disconnect_before_input() {
        let session = run_script(
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
            &[],
        )
        .await;
        assert_eq!(session.outcome, SessionOutcome::Disconnected);
        assert_eq!(session.orchestrator.trace(), &[PhaseKind::AwaitInput]);
        assert!(session.orchestrator.context().is_none());
    }

    #[tokio::test]
    async fn test_unresolved_winner_rejected() {
        let backend = FixedBackend::new(vec![record("https://uni.example/a.html", 0.9, &[], &["exam"])]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["when is the exam", "no"]),
        )
        .await;
        assert!(session.orchestrator.unit().is_rejected("https://uni.example/a.html"));
        assert_eq!(session.orchestrator.trace()[5], PhaseKind::IuChoice);
    }

    #[tokio::test]
    async fn test_new_question_resets_context() {
        let backend = FixedBackend::new(vec![record("https://uni.example/a.html", 0.9, &[], &["exam"])]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["when is the exam", "yes", "yes", "where is the library"]),
        )
        .await;
        let context = session.orchestrator.context().unwrap();
        assert_eq!(context.utterances().len(), 1);
        assert!(context.keywords().contains("library"));
        assert!(!context.keywords().contains("exam"));
        assert!(session.said_any(Language::English, Prompt::NewQuestion));
    }

    // ---- Short-circuits ----

    #[tokio::test]
    async fn test_small_talk_answered_without_backend() {
        let backend = FixedBackend::new(vec![]);
        let session = run_script(
            collaborators(backend.clone()),
            DialogSettings::default(),
            &says(&["hello"]),
        )
        .await;
        assert_eq!(
            session.orchestrator.trace(),
            &[PhaseKind::AwaitInput, PhaseKind::Chatter, PhaseKind::AwaitInput]
        );
        assert!(session
            .messages()
            .contains(&"Hello! What would you like to know?"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_faq_answer_ends_conversation() {
        let index = FaqIndex::from_json(
            r#"{"thesis,deadline": ["When is the thesis deadline?", "June 15th."],
                "exam,resit": ["How do I register for a resit?", "Via the portal."]}"#,
            0.6,
        )
        .unwrap();
        let backend = FixedBackend::new(vec![]);
        let mut collab = collaborators(backend.clone());
        collab.faq = Arc::new(FaqLibrary::new(Some(index), None));

        let session = run_script(
            collab,
            DialogSettings::default(),
            &says(&["when is the thesis deadline", "yes", "yes", "no"]),
        )
        .await;

        assert_eq!(session.outcome, SessionOutcome::Finished);
        assert_eq!(
            session.orchestrator.trace(),
            &[
                PhaseKind::AwaitInput,
                PhaseKind::Chatter,
                PhaseKind::FaqCheck,
                PhaseKind::Done,
            ]
        );
        assert!(session.messages().contains(&"June 15th."));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_denied_faq_remembered_and_backend_queried() {
        let index = FaqIndex::from_json(
            r#"{"thesis,deadline": ["When is the thesis deadline?", "June 15th."],
                "exam,resit": ["How do I register for a resit?", "Via the portal."]}"#,
            0.6,
        )
        .unwrap();
        let backend = FixedBackend::new(vec![]);
        let mut collab = collaborators(backend.clone());
        collab.faq = Arc::new(FaqLibrary::new(Some(index), None));

        let session = run_script(
            collab,
            DialogSettings::default(),
            &says(&["when is the thesis deadline", "no"]),
        )
        .await;

        let context = session.orchestrator.context().unwrap();
        assert_eq!(context.offered_faqs(), &["When is the thesis deadline?".to_string()]);
        assert_eq!(backend.calls(), 1);
    }

    // ---- Clarification ----

    #[tokio::test]
    async fn test_extend_keyword_goes_back_to_chatter() {
        let backend = FixedBackend::new(vec![
            record("https://uni.example/a.html", 0.9, &[], &["thesis"]),
            record("https://uni.example/b.html", 0.85, &[], &["thesis"]),
        ]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["what is the thesis deadline", "robotics"]),
        )
        .await;

        assert_eq!(session.outcome, SessionOutcome::Disconnected);
        let trace = session.orchestrator.trace();
        assert_eq!(trace[5], PhaseKind::IuChoice);
        assert_eq!(trace[6], PhaseKind::Chatter);
        assert_eq!(trace[7], PhaseKind::FaqCheck);

        let context = session.orchestrator.context().unwrap();
        assert!(context.keywords().contains("robotics"));
        assert!(session.orchestrator.unit().is_keyword_confirmed("robotics"));
        assert_eq!(
            session.orchestrator.unit().history()[0].action,
            ActionKind::ExtendKeyword
        );
        assert!(session.said_any(Language::English, Prompt::Keyword));
    }

    #[tokio::test]
    async fn test_extend_keyword_rejects_phrases() {
        let backend = FixedBackend::new(vec![
            record("https://uni.example/a.html", 0.9, &[], &["thesis"]),
            record("https://uni.example/b.html", 0.85, &[], &["thesis"]),
        ]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["what is the thesis deadline", "machine learning", "Robotics"]),
        )
        .await;
        assert!(session.said_any(Language::English, Prompt::WrongKeyword));
        assert!(session
            .orchestrator
            .context()
            .unwrap()
            .keywords()
            .contains("robotics"));
    }

    #[tokio::test]
    async fn test_confirm_level_by_study_name() {
        let catalog = LevelCatalog {
            studies: vec!["Physics".to_string(), "Psychology".to_string()],
            faculties: vec![],
            abbreviations: HashMap::new(),
        };
        let matcher = LevelMatcher::new(catalog, &LevelConfig::default());
        let backend = FixedBackend::new(vec![
            record("https://uni.example/physics-exam.html", 0.9, &["Physics"], &["exam"]),
            record("https://uni.example/psychology-exam.html", 0.85, &["Psychology"], &["exam"]),
        ]);
        let mut collab = collaborators(backend);
        collab.extractor = Arc::new(RuleExtractor::new(Some(matcher)));

        let session = run_script(
            collab,
            DialogSettings::default(),
            &says(&["when is the exam", "yes", "psychology", "yes", "no"]),
        )
        .await;

        assert_eq!(session.outcome, SessionOutcome::Finished);
        assert_eq!(
            session.orchestrator.trace(),
            &[
                PhaseKind::AwaitInput,
                PhaseKind::Chatter,
                PhaseKind::FaqCheck,
                PhaseKind::BackendQuery,
                PhaseKind::ViabilityCheck,
                PhaseKind::IuChoice,
                PhaseKind::ViabilityCheck,
                PhaseKind::Done,
            ]
        );
        let unit = session.orchestrator.unit();
        assert_eq!(unit.confirmed_level(), Some("Psychology"));
        assert_eq!(unit.history()[0].action, ActionKind::ConfirmLevel);
        assert!(session
            .messages()
            .contains(&"<i><p>Answer from https://uni.example/psychology-exam.html</p></i>"));
    }

    #[tokio::test]
    async fn test_denied_keyword_drops_candidates() {
        let backend = FixedBackend::new(vec![
            record("https://uni.example/a.html", 0.9, &[], &["thesis", "master"]),
            record("https://uni.example/b.html", 0.85, &[], &["thesis", "bachelor"]),
        ]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["when is the thesis deadline", "no"]),
        )
        .await;

        let unit = session.orchestrator.unit();
        assert_eq!(unit.history()[0], crate::types::Decision::confirm_keyword("master"));
        assert!(unit
            .candidates()
            .iter()
            .all(|c| !c.keywords.contains("master")));
        // Only "b" is left, so it is offered right away.
        assert!(session
            .messages()
            .contains(&"<i><p>Answer from https://uni.example/b.html</p></i>"));
    }

    #[tokio::test]
    async fn test_denied_winner_after_clarification_rechecks_viability() {
        let backend = FixedBackend::new(vec![
            record("https://uni.example/a.html", 0.9, &[], &["thesis", "master"]),
            record("https://uni.example/b.html", 0.85, &[], &["thesis", "bachelor"]),
        ]);
        let session = run_script(
            collaborators(backend.clone()),
            DialogSettings::default(),
            &says(&["when is the thesis deadline", "no", "no"]),
        )
        .await;

        // Keyword denied, b offered and denied, then the empty set retries
        // the short-circuits before searching again.
        assert_eq!(
            session.orchestrator.trace(),
            &[
                PhaseKind::AwaitInput,
                PhaseKind::Chatter,
                PhaseKind::FaqCheck,
                PhaseKind::BackendQuery,
                PhaseKind::ViabilityCheck,
                PhaseKind::IuChoice,
                PhaseKind::ViabilityCheck,
                PhaseKind::ViabilityCheck,
                PhaseKind::Chatter,
                PhaseKind::FaqCheck,
                PhaseKind::BackendQuery,
                PhaseKind::ViabilityCheck,
            ]
        );
        assert!(session.orchestrator.unit().is_rejected("https://uni.example/b.html"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_desperate_measures_until_accepted() {
        let backend = FixedBackend::new(vec![
            record("https://uni.example/a.html", 0.9, &[], &["thesis"]),
            record("https://uni.example/b.html", 0.85, &[], &["thesis"]),
        ]);
        let settings = DialogSettings {
            thresholds: Thresholds {
                rep_extend: 0,
                ..Thresholds::default()
            },
            ..DialogSettings::default()
        };
        let session = run_script(
            collaborators(backend),
            settings,
            &says(&[
                "when is the thesis deadline",
                "thesis deadline please",
                "no",  // specific study?
                "no",  // specific faculty?
                "yes", // deadline
                "yes", // thesis
                "no",  // top candidate
                "yes", // re-queried b
                "no",  // another question
            ]),
        )
        .await;

        assert_eq!(session.outcome, SessionOutcome::Finished);
        let unit = session.orchestrator.unit();
        let actions: Vec<ActionKind> = unit.history().iter().map(|d| d.action).collect();
        assert_eq!(
            actions,
            vec![
                ActionKind::Rephrase,
                ActionKind::ConfirmLevel,
                ActionKind::ConfirmKeyword,
                ActionKind::ConfirmKeyword,
                ActionKind::OtherMeasures,
            ]
        );
        assert_eq!(unit.confirmed_level(), Some("University"));
        assert!(unit.is_rejected("https://uni.example/a.html"));
        assert!(!unit.is_rejected("https://uni.example/b.html"));
        assert_eq!(
            session.orchestrator.context().unwrap().level(),
            Some("University")
        );
    }

    #[tokio::test]
    async fn test_unclear_another_question_listens_again() {
        let backend = FixedBackend::new(vec![record("https://uni.example/a.html", 0.9, &[], &["exam"])]);
        let session = run_script(
            collaborators(backend),
            DialogSettings::default(),
            &says(&["when is the exam", "yes", "maybe", "where is the library"]),
        )
        .await;

        let trace = session.orchestrator.trace();
        assert_eq!(trace[4], PhaseKind::ViabilityCheck);
        assert_eq!(trace[5], PhaseKind::AwaitInput);
        assert!(!session.said_any(Language::English, Prompt::NewQuestion));
        assert!(!session.said_any(Language::English, Prompt::Closing));
        let context = session.orchestrator.context().unwrap();
        assert!(context.keywords().contains("library"));
        assert_eq!(context.utterances().len(), 1);
    }

    // ---- Dispatch boundary ----

    fn idle_orchestrator() -> Orchestrator<ChannelTransport> {
        let (transport, _to_session, _from_session) = ChannelTransport::pair(4);
        Orchestrator::new(
            Uuid::new_v4(),
            transport,
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
        )
    }

    #[test]
    fn test_enter_records_legal_edge() {
        let mut orchestrator = idle_orchestrator();
        orchestrator.enter(PhaseKind::AwaitInput, PhaseKind::Chatter);
        assert_eq!(orchestrator.trace(), &[PhaseKind::Chatter]);
    }

    #[test]
    #[should_panic(expected = "orchestration invariant violated")]
    fn test_illegal_edge_panics() {
        let mut orchestrator = idle_orchestrator();
        orchestrator.enter(PhaseKind::AwaitInput, PhaseKind::Done);
    }

    #[test]
    fn test_step_budget_reaches_limit() {
        let mut orchestrator = idle_orchestrator();
        orchestrator.steps_without_input = MAX_STEPS_WITHOUT_INPUT - 1;
        orchestrator.enter(PhaseKind::Chatter, PhaseKind::FaqCheck);
        assert_eq!(orchestrator.steps_without_input, MAX_STEPS_WITHOUT_INPUT);
    }

    #[test]
    #[should_panic(expected = "steps without reading input")]
    fn test_stuck_loop_panics() {
        let mut orchestrator = idle_orchestrator();
        orchestrator.steps_without_input = MAX_STEPS_WITHOUT_INPUT;
        orchestrator.enter(PhaseKind::Chatter, PhaseKind::FaqCheck);
    }

    #[tokio::test]
    #[should_panic(expected = "orchestration invariant violated")]
    async fn test_step_after_done_panics() {
        let mut orchestrator = idle_orchestrator();
        let _ = orchestrator.step(Phase::Done).await;
    }

    #[tokio::test]
    #[should_panic(expected = "no discourse context")]
    async fn test_clarifying_without_context_panics() {
        let mut orchestrator = idle_orchestrator();
        let _ = orchestrator.step(Phase::IuChoice).await;
    }

    // ---- Degradation and transport ----

    #[tokio::test]
    async fn test_backend_down_apologises() {
        let session = run_script(
            collaborators(Arc::new(DownBackend)),
            DialogSettings::default(),
            &says(&["when is the thesis deadline"]),
        )
        .await;
        assert_eq!(session.outcome, SessionOutcome::Disconnected);
        assert!(session.said_any(Language::English, Prompt::ServiceDown));
        assert!(session.orchestrator.unit().candidates().is_empty());
    }

    #[tokio::test]
    async fn test_language_switch_event() {
        let session = run_script(
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
            &[ClientEvent::Language(Language::Dutch)],
        )
        .await;
        assert!(session
            .events
            .contains(&ServerEvent::Language(Language::Dutch)));
        assert!(session.said_any(Language::Dutch, Prompt::LanguageSwitched));
        assert_eq!(session.orchestrator.language(), Language::Dutch);
    }

    #[tokio::test]
    async fn test_markup_gets_fool_message() {
        let session = run_script(
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
            &says(&["<b>hello</b>"]),
        )
        .await;
        assert!(session.said_any(Language::English, Prompt::Fool));
    }

    #[tokio::test]
    async fn test_transcript_written() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, to_session, _from_session) = ChannelTransport::pair(64);
        for input in says(&["hello", "thanks"]) {
            to_session.send(input).await.unwrap();
        }
        drop(to_session);

        let mut orchestrator = Orchestrator::new(
            Uuid::new_v4(),
            transport,
            collaborators(FixedBackend::new(vec![])),
            DialogSettings::default(),
        )
        .with_transcript(dir.path(), 0);
        orchestrator.run().await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(content.contains("U: hello\n"));
        assert!(content.contains("C: Hello! What would you like to know?\n"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = DialogConfig {
            default_language: "dutch".to_string(),
            bot_name: "Uvabot".to_string(),
            ..DialogConfig::default()
        };
        let settings = DialogSettings::from_config(&config);
        assert_eq!(settings.default_language, Language::Dutch);
        assert_eq!(settings.phrasebook.bot_name(), "Uvabot");
        assert_eq!(settings.broad_level, "University");
    }

    #[test]
    fn test_settings_unknown_language_falls_back() {
        let config = DialogConfig {
            default_language: "klingon".to_string(),
            ..DialogConfig::default()
        };
        assert_eq!(DialogSettings::from_config(&config).default_language, Language::English);
    }
}
