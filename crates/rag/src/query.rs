//! Query rewriting and multi-query expansion.

use crate::generation::Generator;
use notevault_core::config::RetrievalSettings;
use notevault_prompt::builtin;
use std::collections::HashSet;
use tracing::{debug, warn};

const REWRITE_TEMPERATURE: f32 = 0.0;
const EXPAND_TEMPERATURE: f32 = 0.7;

/// Turns a user question into the list of queries to search.
///
/// Without a generator, or with both features off, the output is just the
/// original query. LLM failures degrade the same way.
#[derive(Debug, Clone)]
pub struct QueryPreprocessor {
    generator: Option<Generator>,
    rewrite: bool,
    multi_query: bool,
    multi_query_count: usize,
}

impl QueryPreprocessor {
    pub fn new(generator: Option<Generator>) -> Self {
        Self {
            generator,
            rewrite: false,
            multi_query: false,
            multi_query_count: 3,
        }
    }

    pub fn from_settings(generator: Option<Generator>, settings: &RetrievalSettings) -> Self {
        Self::new(generator)
            .with_rewrite(settings.rewrite_query)
            .with_multi_query(settings.multi_query, settings.multi_query_count)
    }

    pub fn with_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn with_multi_query(mut self, enabled: bool, count: usize) -> Self {
        self.multi_query = enabled;
        self.multi_query_count = count;
        self
    }

    /// Most queries `preprocess` can return.
    pub fn max_queries(&self) -> usize {
        let variants = if self.multi_query {
            self.multi_query_count
        } else {
            0
        };
        1 + variants + usize::from(self.rewrite)
    }

    /// Primary query first (rewritten if that succeeded), then the original
    /// when it was rewritten, then alternative phrasings. De-duplicated.
    pub async fn preprocess(&self, query: &str) -> Vec<String> {
        let original = query.trim().to_string();

        let generator = match &self.generator {
            Some(g) if self.rewrite || (self.multi_query && self.multi_query_count > 0) => g,
            _ => return vec![original],
        };

        let (rewritten, variants) = tokio::join!(
            self.rewrite_query(generator, &original),
            self.expand_query(generator, &original)
        );

        let mut queries = Vec::with_capacity(self.max_queries());
        match rewritten {
            Some(rewritten) => {
                queries.push(rewritten);
                queries.push(original);
            }
            None => queries.push(original),
        }
        queries.extend(variants);

        let queries = dedupe(queries, self.max_queries());
        debug!("Searching with {} queries: {:?}", queries.len(), queries);
        queries
    }

    async fn rewrite_query(&self, generator: &Generator, query: &str) -> Option<String> {
        if !self.rewrite {
            return None;
        }

        match generator
            .run(
                builtin::QUERY_REWRITE,
                &[("query", query.to_string())],
                REWRITE_TEMPERATURE,
            )
            .await
        {
            Ok(output) => output.lines().map(clean_line).find(|l| !l.is_empty()),
            Err(e) => {
                warn!("Query rewrite failed, using original query: {}", e);
                None
            }
        }
    }

    async fn expand_query(&self, generator: &Generator, query: &str) -> Vec<String> {
        if !self.multi_query || self.multi_query_count == 0 {
            return Vec::new();
        }

        match generator
            .run(
                builtin::QUERY_EXPAND,
                &[
                    ("query", query.to_string()),
                    ("count", self.multi_query_count.to_string()),
                ],
                EXPAND_TEMPERATURE,
            )
            .await
        {
            Ok(output) => output
                .lines()
                .map(clean_line)
                .filter(|l| !l.is_empty())
                .take(self.multi_query_count)
                .collect(),
            Err(e) => {
                warn!("Query expansion failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Strip list markers and wrapping quotes from one line of model output.
fn clean_line(line: &str) -> String {
    let line = line.trim();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let line = match line[digits..].chars().next() {
        Some('.') | Some(')') if digits > 0 => &line[digits + 1..],
        _ => line,
    };
    line.trim_start_matches(['-', '*', '•'])
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

/// Keep the first occurrence of each query, ignoring case and spacing.
fn dedupe(queries: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(normalize(q)))
        .take(cap)
        .collect()
}

fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
