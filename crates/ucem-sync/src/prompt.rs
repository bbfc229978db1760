/// Operator-facing console: shows reports and asks for confirmation.
///
/// Library code never touches stdin/stdout directly, so tests can script the
/// answers and capture what would have been shown.
pub trait Prompt: Send + Sync {
    fn show(&self, text: &str);

    /// Ask whether to go ahead with `action` (e.g. "remove 2 exception(s)").
    fn confirm(&self, action: &str) -> bool;
}
