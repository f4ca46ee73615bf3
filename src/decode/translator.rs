/// The part of the source visible to the translator.
#[derive(Debug, Clone, Copy)]
pub struct SourceView<'a> {
    pub tokens: &'a [String],
    /// True once every source token has been read.
    pub complete: bool,
}

impl<'a> SourceView<'a> {
    pub fn new(tokens: &'a [String], complete: bool) -> Self {
        SourceView { tokens, complete }
    }
}

/// The translator's proposal for the next target token.
#[derive(Debug, Clone)]
pub struct Step<S> {
    /// `None` proposes end of sentence.
    pub token: Option<String>,
    pub confidence: f32,
    /// Decoder state to adopt if the token is committed.
    pub state: S,
}

/// Model boundary: an incremental sequence-to-sequence translator.
///
/// The runner re-scores with [`Translator::step`] after every WAIT, since
/// the visible source changed, and advances the decoder state only on COMMIT.
pub trait Translator {
    type State: Clone;

    /// Decoder state before any target token is written.
    fn init(&mut self, source: SourceView<'_>) -> Self::State;

    /// Propose the next target token given the visible source.
    fn step(&mut self, source: SourceView<'_>, state: &Self::State) -> Step<Self::State>;

    /// Cost of `target` given the full `source`.
    fn cost(&mut self, source: &[String], target: &[String]) -> f32;

    /// Finetune on one full-sentence pair.
    fn update(&mut self, _source: &[String], _target: &[String]) {}
}

/// Monotone copy model: target token `j` is source token `j`.
///
/// Before source token `j` has been read it guesses by repeating the last
/// visible token with zero confidence, so committing early costs quality.
#[derive(Debug, Clone, Default)]
pub struct CopyTranslator;

impl CopyTranslator {
    pub fn new() -> Self {
        CopyTranslator
    }
}

impl Translator for CopyTranslator {
    /// Number of tokens written so far.
    type State = usize;

    fn init(&mut self, _source: SourceView<'_>) -> usize {
        0
    }

    fn step(&mut self, source: SourceView<'_>, state: &usize) -> Step<usize> {
        let position = *state;
        let (token, confidence) = match source.tokens.get(position) {
            Some(token) => (Some(token.clone()), 1.0),
            None if source.complete => (None, 1.0),
            None => (
                Some(source.tokens.last().cloned().unwrap_or_else(|| "<unk>".to_string())),
                0.0,
            ),
        };
        Step {
            token,
            confidence,
            state: position + 1,
        }
    }

    /// Fraction of positions where the copy disagrees with `target`.
    fn cost(&mut self, source: &[String], target: &[String]) -> f32 {
        let len = source.len().max(target.len());
        if len == 0 {
            return 0.0;
        }
        let errors = (0..len)
            .filter(|&j| source.get(j) != target.get(j))
            .count();
        errors as f32 / len as f32
    }
}
