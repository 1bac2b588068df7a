// Event types for async communication

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Model identifiers reported by the engine, smallest first
    ModelsListed(Vec<String>),
    /// The selected model could not be loaded; the turn is abandoned
    ModelLoadFailed(String),
    /// The model is loaded and fragments are about to arrive
    GenerationStarted,
    /// A fragment of the assistant reply
    Fragment(String),
    /// Generation ended, carrying the engine's full message
    GenerationFinished(String),
    /// An error occurred during generation
    GenerationFailed(String),
}
