use crate::error::PipelineError;
use crate::models::RetrievedChunk;
use regex::Regex;
use std::collections::BTreeSet;

pub const CONTEXT_VARIABLE: &str = "context";
pub const QUESTION_VARIABLE: &str = "question";

/// Separator placed between retrieved chunks when they are stuffed into the
/// `context` variable.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

const QUESTION_ANSWERING_TEMPLATE: &str = "Answer the question as truthfully as possible and in as much detail as possible \
using the context below, make sure to provide all the details, \
if you don't know the answer, just say \"I don't know\", \
don't try to make up an answer.\n\n\
Context: {context}\n\n\
Question: {question}\n\n\
Answer:\n";

fn variable_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Fails unless `input_variables` names exactly the `{placeholders}` in
    /// `template`.
    pub fn new(template: impl Into<String>, input_variables: &[&str]) -> Result<Self, PipelineError> {
        let template = template.into();
        let found = variable_pattern()?
            .captures_iter(&template)
            .filter_map(|capture| capture.get(1).map(|m| m.as_str().to_string()))
            .collect::<BTreeSet<_>>();
        let declared = input_variables
            .iter()
            .map(|name| name.to_string())
            .collect::<BTreeSet<_>>();

        if found != declared {
            return Err(PipelineError::InvalidTemplate(format!(
                "template uses {found:?} but declares {declared:?}"
            )));
        }

        Ok(Self {
            template,
            input_variables: declared.into_iter().collect(),
        })
    }

    /// The grounded question-answering prompt over `context` and `question`.
    pub fn question_answering() -> Self {
        Self {
            template: QUESTION_ANSWERING_TEMPLATE.to_string(),
            input_variables: vec![CONTEXT_VARIABLE.to_string(), QUESTION_VARIABLE.to_string()],
        }
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Substitutes every variable verbatim. Values are inserted in a single
    /// pass, so braces inside them are never re-expanded.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PipelineError> {
        for name in &self.input_variables {
            if !values.iter().any(|(key, _)| key == name) {
                return Err(PipelineError::InvalidTemplate(format!(
                    "missing value for {{{name}}}"
                )));
            }
        }

        let pattern = variable_pattern()?;
        let rendered = pattern.replace_all(&self.template, |capture: &regex::Captures<'_>| {
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

/// Joins retrieved chunk texts into one context block.
pub fn stuff_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}
