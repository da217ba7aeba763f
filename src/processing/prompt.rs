//! Prompt assembly for retrieval-augmented answers.
//!
//! Templates are plain text with `{name}` placeholders. Rendering is a single left-to-right
//! pass: substituted values are copied verbatim, so braces inside a question or a retrieved
//! passage are never interpreted as placeholders.

const SYSTEM_PREAMBLE: &str = "You are a highly skilled assistant that answers questions using \
the context provided by the user. Read and understand the given context, then write a concise \
and accurate answer to the question.";

const QUESTION_TEMPLATE: &str = "{preamble}\n\nQuestion: {question}\nContext: {context}\nAnswer:";
const CUSTOM_TEMPLATE: &str = "Instruction: {instruction}\n{preamble}";
const ANSWER_TEMPLATE: &str = "Answer: {answer}\nEnd of Answer.";

/// Separator placed between retrieved passages in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fixed-preamble prompt builder.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    preamble: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            preamble: SYSTEM_PREAMBLE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Builder with a caller-supplied preamble.
    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }

    /// System preamble prepended to every question.
    pub fn system_prompt(&self) -> &str {
        &self.preamble
    }

    /// Prompt combining the preamble, the question and the retrieved context.
    pub fn question_prompt(&self, question: &str, context: &str) -> String {
        render(
            QUESTION_TEMPLATE,
            &[
                ("preamble", &self.preamble),
                ("question", question),
                ("context", context),
            ],
        )
    }

    /// Prompt prefixing the preamble with a free-form instruction.
    pub fn custom_prompt(&self, instruction: &str) -> String {
        render(
            CUSTOM_TEMPLATE,
            &[("instruction", instruction), ("preamble", &self.preamble)],
        )
    }

    /// Wrap a generated answer for display.
    pub fn format_answer(&self, answer: &str) -> String {
        render(ANSWER_TEMPLATE, &[("answer", answer)])
    }
}

/// Join retrieved passages, nearest first, into one context block.
pub fn join_context<'a>(passages: impl IntoIterator<Item = &'a str>) -> String {
    passages
        .into_iter()
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Substitute `{name}` placeholders in one pass; unknown placeholders are kept verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_prompt_layout() {
        let template = PromptTemplate::with_preamble("Be brief.");
        assert_eq!(
            template.question_prompt("What is a mammal?", "cats are mammals"),
            "Be brief.\n\nQuestion: What is a mammal?\nContext: cats are mammals\nAnswer:"
        );
    }

    #[test]
    fn substituted_values_are_not_expanded() {
        let template = PromptTemplate::with_preamble("P");
        let prompt = template.question_prompt("why {context}?", "literal {question} {preamble}");
        assert_eq!(
            prompt,
            "P\n\nQuestion: why {context}?\nContext: literal {question} {preamble}\nAnswer:"
        );
    }

    #[test]
    fn custom_prompt_and_answer_formatting() {
        let template = PromptTemplate::with_preamble("P");
        assert_eq!(template.custom_prompt("Summarize"), "Instruction: Summarize\nP");
        assert_eq!(template.format_answer("42"), "Answer: 42\nEnd of Answer.");
        assert!(PromptTemplate::default().system_prompt().starts_with("You are"));
    }

    #[test]
    fn unknown_placeholders_survive_rendering() {
        assert_eq!(render("{a} {b} {", &[("a", "x")]), "x {b} {");
        assert_eq!(join_context(["one", "two"]), "one\n\ntwo");
    }
}
