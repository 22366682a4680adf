//! Phrasebook and reply classification.
//!
//! Every message the assistant sends comes from here. Each prompt has a few
//! variants per language and one is picked at random, so a long exchange
//! does not read like a form.

use std::sync::LazyLock;

use rand::seq::IndexedRandom;
use regex::Regex;

use crate::types::Language;

// =============================================================================
// Prompts
// =============================================================================

/// Kind of message the assistant can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    Greeting,
    Searching,
    ServiceDown,
    AnswerIntro,
    Link,
    Resolved,
    ConfirmQuestion,
    ConfirmAddition,
    AnotherQuestion,
    Repeat,
    Level,
    Keyword,
    WrongKeyword,
    Rephrase,
    NewQuestion,
    Closing,
    Fool,
    LanguageSwitched,
}

pub(crate) fn variants(language: Language, prompt: Prompt) -> &'static [&'static str] {
    match (language, prompt) {
        (Language::English, Prompt::Greeting) => &[
            "Hi, I am {name}. What is your question?",
            "Hello! My name is {name}. How can I help you?",
            "Welcome, I am {name}. Ask me anything about your studies.",
        ],
        (Language::Dutch, Prompt::Greeting) => &[
            "Hoi, ik ben {name}. Wat is je vraag?",
            "Hallo! Ik heet {name}. Waarmee kan ik je helpen?",
            "Welkom, ik ben {name}. Stel gerust je vraag over je studie.",
        ],
        (Language::English, Prompt::Searching) => &[
            "Let me look that up for you.",
            "One moment, I am searching.",
            "Give me a second to find that.",
        ],
        (Language::Dutch, Prompt::Searching) => &[
            "Even voor je opzoeken.",
            "Een momentje, ik ben aan het zoeken.",
            "Geef me een seconde om dat te vinden.",
        ],
        (Language::English, Prompt::ServiceDown) => &[
            "Sorry, I cannot reach the search service right now.",
            "My apologies, the search service seems to be down.",
        ],
        (Language::Dutch, Prompt::ServiceDown) => &[
            "Sorry, ik kan de zoekdienst nu niet bereiken.",
            "Excuses, de zoekdienst lijkt niet te werken.",
        ],
        (Language::English, Prompt::AnswerIntro) => &[
            "I found this:",
            "This might answer your question:",
            "Here is what I found:",
        ],
        (Language::Dutch, Prompt::AnswerIntro) => &[
            "Ik vond dit:",
            "Dit kan je vraag beantwoorden:",
            "Dit is wat ik heb gevonden:",
        ],
        (Language::English, Prompt::Link) => &[
            "More about {subject} via this {link}.",
            "You can read more on {subject} at this {link}.",
        ],
        (Language::Dutch, Prompt::Link) => &[
            "Meer over {subject} via deze {link}.",
            "Je kunt meer lezen over {subject} op deze {link}.",
        ],
        (Language::English, Prompt::Resolved) => &[
            "Did this answer your question?",
            "Does this solve your problem?",
            "Is this what you were looking for?",
        ],
        (Language::Dutch, Prompt::Resolved) => &[
            "Heeft dit je vraag beantwoord?",
            "Lost dit je probleem op?",
            "Is dit wat je zocht?",
        ],
        (Language::English, Prompt::ConfirmQuestion) => &[
            "Is your question: {subject}",
            "Do you mean: {subject}",
        ],
        (Language::Dutch, Prompt::ConfirmQuestion) => &[
            "Is je vraag: {subject}",
            "Bedoel je: {subject}",
        ],
        (Language::English, Prompt::ConfirmAddition) => &[
            "Is your question about {subject}?",
            "Does your question have to do with {subject}?",
        ],
        (Language::Dutch, Prompt::ConfirmAddition) => &[
            "Gaat je vraag over {subject}?",
            "Heeft je vraag te maken met {subject}?",
        ],
        (Language::English, Prompt::AnotherQuestion) => &[
            "Great! Do you have another question?",
            "Glad I could help. Anything else?",
        ],
        (Language::Dutch, Prompt::AnotherQuestion) => &[
            "Top! Heb je nog een vraag?",
            "Fijn dat ik kon helpen. Nog iets anders?",
        ],
        (Language::English, Prompt::Repeat) => &[
            "Sorry, I did not get that. Could you say it again?",
            "I did not quite understand. Please try again.",
        ],
        (Language::Dutch, Prompt::Repeat) => &[
            "Sorry, dat begreep ik niet. Kun je het nog eens zeggen?",
            "Dat snapte ik niet helemaal. Probeer het nog eens.",
        ],
        (Language::English, Prompt::Level) => &[
            "Which {subject} is it about?",
            "What is the name of the {subject}?",
        ],
        (Language::Dutch, Prompt::Level) => &[
            "Om welke {subject} gaat het?",
            "Wat is de naam van de {subject}?",
        ],
        (Language::English, Prompt::Keyword) => &[
            "Can you give me one more word that describes your question?",
            "Could you add a single keyword to your question?",
        ],
        (Language::Dutch, Prompt::Keyword) => &[
            "Kun je nog een woord geven dat je vraag beschrijft?",
            "Kun je een extra trefwoord aan je vraag toevoegen?",
        ],
        (Language::English, Prompt::WrongKeyword) => &[
            "Just one word please.",
            "That is more than one word, please give me a single keyword.",
        ],
        (Language::Dutch, Prompt::WrongKeyword) => &[
            "Maar een woord alsjeblieft.",
            "Dat is meer dan een woord, geef me een enkel trefwoord.",
        ],
        (Language::English, Prompt::Rephrase) => &[
            "Could you rephrase your question?",
            "Can you ask your question in a different way?",
        ],
        (Language::Dutch, Prompt::Rephrase) => &[
            "Kun je je vraag anders formuleren?",
            "Kun je je vraag op een andere manier stellen?",
        ],
        (Language::English, Prompt::NewQuestion) => &[
            "What is your next question?",
            "Go ahead, ask away.",
        ],
        (Language::Dutch, Prompt::NewQuestion) => &[
            "Wat is je volgende vraag?",
            "Ga je gang, stel je vraag.",
        ],
        (Language::English, Prompt::Closing) => &[
            "Goodbye, have a nice day!",
            "Bye! Good luck with your studies.",
        ],
        (Language::Dutch, Prompt::Closing) => &[
            "Doei, nog een fijne dag!",
            "Tot ziens! Succes met je studie.",
        ],
        (Language::English, Prompt::Fool) => &[
            "Nice try, but I only read plain text.",
            "You cannot fool me that easily.",
        ],
        (Language::Dutch, Prompt::Fool) => &[
            "Goed geprobeerd, maar ik lees alleen gewone tekst.",
            "Zo makkelijk hou je mij niet voor de gek.",
        ],
        (Language::English, Prompt::LanguageSwitched) => &["I will talk English to you from now on."],
        (Language::Dutch, Prompt::LanguageSwitched) => &["Vanaf nu praat ik Nederlands met je."],
    }
}

/// Level kinds the assistant can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Study,
    Faculty,
}

impl LevelKind {
    /// Phrase for "is it about a specific ...?".
    fn specific(self, language: Language) -> &'static str {
        match (language, self) {
            (Language::English, LevelKind::Study) => "a specific study program",
            (Language::English, LevelKind::Faculty) => "a specific faculty",
            (Language::Dutch, LevelKind::Study) => "een bepaalde studie",
            (Language::Dutch, LevelKind::Faculty) => "een bepaalde faculteit",
        }
    }

    fn noun(self, language: Language) -> &'static str {
        match (language, self) {
            (Language::English, LevelKind::Study) => "study program",
            (Language::English, LevelKind::Faculty) => "faculty",
            (Language::Dutch, LevelKind::Study) => "studie",
            (Language::Dutch, LevelKind::Faculty) => "faculteit",
        }
    }
}

// =============================================================================
// Phrasebook
// =============================================================================

/// Produces the assistant's messages.
#[derive(Debug, Clone)]
pub struct Phrasebook {
    bot_name: String,
}

impl Phrasebook {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// A random variant of `prompt`, with the bot name filled in.
    pub fn phrase(&self, language: Language, prompt: Prompt) -> String {
        let options = variants(language, prompt);
        let chosen = options.choose(&mut rand::rng()).copied().unwrap_or_default();
        chosen.replace("{name}", &self.bot_name)
    }

    fn phrase_with(&self, language: Language, prompt: Prompt, subject: &str) -> String {
        self.phrase(language, prompt).replace("{subject}", subject)
    }

    /// Confirmation question.
    ///
    /// Without a subject this asks whether the question was resolved. A
    /// subject containing `?` is quoted as a question, anything else is
    /// asked about as a topic.
    pub fn confirm(&self, language: Language, subject: Option<&str>) -> String {
        match subject {
            None => self.phrase(language, Prompt::Resolved),
            Some(s) if s.contains('?') => self.phrase_with(language, Prompt::ConfirmQuestion, s),
            Some(s) => self.phrase_with(language, Prompt::ConfirmAddition, s),
        }
    }

    pub fn confirm_level_kind(&self, language: Language, kind: LevelKind) -> String {
        self.confirm(language, Some(kind.specific(language)))
    }

    pub fn level_prompt(&self, language: Language, kind: LevelKind) -> String {
        self.phrase_with(language, Prompt::Level, kind.noun(language))
    }

    /// The three messages that present a candidate answer.
    pub fn link_and_answer(&self, language: Language, url: &str, answer: &str) -> Vec<String> {
        let link = format!(r#"<a href="{url}" target="_blank">link</a>"#);
        let subject = format!("<b>{}</b>", link_subject(url));
        let line = self
            .phrase(language, Prompt::Link)
            .replace("{link}", &link)
            .replace("{subject}", &subject);
        vec![
            self.phrase(language, Prompt::AnswerIntro),
            format!("<i><p>{answer}</p></i>"),
            line,
        ]
    }
}

impl Default for Phrasebook {
    fn default() -> Self {
        Self::new("Clarify")
    }
}

/// Human-readable subject from a URL's last path segment.
fn link_subject(url: &str) -> String {
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    let stem = last.split('.').next().unwrap_or(last);
    stem.replace('-', " ")
}

// =============================================================================
// Reply classification
// =============================================================================

/// How a reply to a yes/no question reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affirmation {
    Yes,
    No,
    Unclear,
}

impl Affirmation {
    pub fn is_yes(self) -> bool {
        self == Affirmation::Yes
    }
}

/// Classified reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub affirmation: Affirmation,
    /// Both confirming and denying words were present.
    pub contradictory: bool,
}

const CONFIRMATIONS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "correct", "right", "indeed", "ok", "okay",
    "absolutely", "definitely", "y", "ja", "jazeker", "jawel", "klopt", "zeker", "prima",
    "inderdaad", "oke", "oké", "precies", "juist",
];

const NEGATIONS: &[&str] = &[
    "no", "nope", "not", "nah", "don't", "dont", "incorrect", "wrong", "never", "n", "nee",
    "neen", "niet", "fout", "geen", "nooit", "neh",
];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").expect("Invalid word regex"));

/// Classify a free-text reply to a yes/no question.
///
/// A confirming word directly next to a denying one ("klopt niet", "not
/// correct") counts as denial only.
pub fn classify_reply(text: &str) -> Reply {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();
    let is_neg = |i: usize| tokens.get(i).is_some_and(|t| NEGATIONS.contains(t));

    let negated = (0..tokens.len()).any(is_neg);
    let confirmed = tokens.iter().enumerate().any(|(i, t)| {
        CONFIRMATIONS.contains(t) && !is_neg(i + 1) && !(i > 0 && is_neg(i - 1))
    });

    let (affirmation, contradictory) = match (confirmed, negated) {
        (true, true) => (Affirmation::Unclear, true),
        (true, false) => (Affirmation::Yes, false),
        (false, true) => (Affirmation::No, false),
        (false, false) => (Affirmation::Unclear, false),
    };
    Reply {
        affirmation,
        contradictory,
    }
}
