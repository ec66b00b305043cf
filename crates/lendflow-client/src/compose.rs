/// Append an uploaded document's extracted summary to the outgoing text as a
/// bracketed `[LABEL: summary]` annotation.
///
/// The label is upper-cased; blank summaries leave the text untouched.
pub fn annotate_with_document(text: &str, label: &str, summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        return text.to_string();
    }

    let annotation = format!("[{}: {}]", label.trim().to_uppercase(), summary);
    let text = text.trim_end();
    if text.is_empty() {
        annotation
    } else {
        format!("{}\n\n{}", text, annotation)
    }
}
