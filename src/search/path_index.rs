use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, ReloadPolicy};

use crate::models::DocumentRecord;
use crate::search::bm25::strip_query_syntax;

const WRITER_BUDGET: usize = 15_000_000;

/// Terms shared by most paths (file extensions, drive root labels). A hint
/// made only of these identifies nothing.
const NON_IDENTIFYING_TERMS: &[&str] = &[
    "root", "shared", "pdf", "docx", "txt", "md", "csv", "json", "html", "htm", "xls",
    "xlsx", "ppt", "pptx",
];

/// Lexical index over document identity records, used only to turn a
/// free-text file/folder mention into a document id.
pub struct PathIndex {
    records: Vec<DocumentRecord>,
    index: Index,
    reader: IndexReader,
    f_ordinal: Field,
    f_name: Field,
    f_path: Field,
}

impl PathIndex {
    /// Build the index. Record order is the tie-break order of [`PathIndex::resolve`].
    pub fn build(records: Vec<DocumentRecord>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let f_ordinal = schema_builder.add_u64_field("ordinal", NumericOptions::default() | STORED);
        let f_name = schema_builder.add_text_field("name", TEXT);
        let f_path = schema_builder.add_text_field("path", TEXT);
        let index = Index::create_in_ram(schema_builder.build());

        let mut writer = index
            .writer_with_num_threads(1, WRITER_BUDGET)
            .context("Failed to create path index writer")?;
        for (ordinal, record) in records.iter().enumerate() {
            writer.add_document(doc!(
                f_ordinal => ordinal as u64,
                f_name => record.name.clone(),
                f_path => record.path.clone(),
            ))?;
        }
        writer.commit().context("Failed to commit path index")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create path index reader")?;

        Ok(Self {
            records,
            index,
            reader,
            f_ordinal,
            f_name,
            f_path,
        })
    }

    /// Resolve a file/folder mention to the best-matching document id.
    ///
    /// An exact (case-insensitive) path or name match wins outright. Otherwise
    /// the top BM25 match over path and name is returned; equal scores go to the
    /// record inserted first. `None` means "do not scope".
    pub fn resolve(&self, hint: Option<&str>) -> crate::error::Result<Option<String>> {
        let hint = match hint.map(str::trim) {
            Some(h) if !h.is_empty() => h,
            _ => return Ok(None),
        };
        if self.records.is_empty() {
            return Ok(None);
        }

        if let Some(record) = self.exact_match(hint) {
            tracing::debug!("Hint '{hint}' matched '{}' exactly", record.path);
            return Ok(Some(record.id.clone()));
        }

        let terms = identifying_terms(hint);
        if terms.is_empty() {
            tracing::info!("Hint '{hint}' has no identifying terms; searching unscoped");
            return Ok(None);
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.f_path, self.f_name]);
        let (query, _) = parser.parse_query_lenient(&terms);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.records.len()))?;

        let mut best: Option<(f32, usize)> = None;
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let Some(ordinal) = doc.get_first(self.f_ordinal).and_then(|v| v.as_u64()) else {
                continue;
            };
            let ordinal = ordinal as usize;
            best = match best {
                Some((best_score, best_ordinal))
                    if best_score > score || (best_score == score && best_ordinal < ordinal) =>
                {
                    Some((best_score, best_ordinal))
                }
                _ => Some((score, ordinal)),
            };
        }

        match best.and_then(|(_, ordinal)| self.records.get(ordinal)) {
            Some(record) => {
                tracing::info!("Hint '{hint}' resolved to '{}'", record.path);
                Ok(Some(record.id.clone()))
            }
            None => {
                tracing::info!("Hint '{hint}' matched no document; searching unscoped");
                Ok(None)
            }
        }
    }

    fn exact_match(&self, hint: &str) -> Option<&DocumentRecord> {
        let wanted = hint.to_lowercase();
        self.records
            .iter()
            .find(|r| r.path.trim().to_lowercase() == wanted)
            .or_else(|| {
                self.records
                    .iter()
                    .find(|r| r.name.trim().to_lowercase() == wanted)
            })
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Hint words minus extensions and root labels, ready for the query parser.
fn identifying_terms(hint: &str) -> String {
    strip_query_syntax(hint)
        .split_whitespace()
        .filter(|t| !NON_IDENTIFYING_TERMS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, path: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            name: path.rsplit(" > ").next().unwrap_or(path).to_string(),
            path: path.to_string(),
        }
    }

    fn sample() -> PathIndex {
        PathIndex::build(vec![
            record("id-q3", "root > financials > Q3_report.pdf"),
            record("id-plan", "root > hr > hiring_plan.pdf"),
            record("id-notes", "shared > meeting notes.pdf"),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_path_resolves() {
        let index = sample();
        for r in index.records().to_vec() {
            assert_eq!(index.resolve(Some(&r.path)).unwrap(), Some(r.id.clone()));
        }
    }

    #[test]
    fn test_exact_name_resolves_case_insensitively() {
        let index = sample();
        assert_eq!(
            index.resolve(Some("HIRING_PLAN.PDF")).unwrap(),
            Some("id-plan".to_string())
        );
    }

    #[test]
    fn test_partial_hint_resolves() {
        let index = sample();
        assert_eq!(
            index.resolve(Some("Q3 report")).unwrap(),
            Some("id-q3".to_string())
        );
        assert_eq!(
            index.resolve(Some("the meeting notes")).unwrap(),
            Some("id-notes".to_string())
        );
    }

    #[test]
    fn test_no_hint_or_blank_hint() {
        let index = sample();
        assert_eq!(index.resolve(None).unwrap(), None);
        assert_eq!(index.resolve(Some("   ")).unwrap(), None);
    }

    #[test]
    fn test_unmatched_hint_returns_none() {
        let index = sample();
        assert_eq!(index.resolve(Some("nonexistent.docx")).unwrap(), None);
    }

    #[test]
    fn test_extension_alone_does_not_match() {
        let index = sample();
        assert_eq!(index.resolve(Some("nonexistent.pdf")).unwrap(), None);
        assert_eq!(index.resolve(Some("pdf")).unwrap(), None);
    }

    #[test]
    fn test_identifying_terms() {
        assert_eq!(identifying_terms("root > Q3_report.PDF"), "q3 report");
        assert_eq!(identifying_terms("doc A"), "doc a");
    }

    #[test]
    fn test_empty_corpus_returns_none() {
        let index = PathIndex::build(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.resolve(Some("anything")).unwrap(), None);
    }

    #[test]
    fn test_tie_goes_to_first_inserted() {
        let index = PathIndex::build(vec![
            record("first", "root > alpha > budget.pdf"),
            record("second", "root > beta > budget.pdf"),
        ])
        .unwrap();
        assert_eq!(index.resolve(Some("budget")).unwrap(), Some("first".to_string()));
    }
}
