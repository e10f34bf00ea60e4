//! Tantivy-based search index module.
//!
//! Provides full-text search over songs with field boosting.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Song;

/// Field boost values.
const BOOST_TITLE: f32 = 10.0;
const BOOST_TAGS: f32 = 8.0;
const BOOST_AUTHOR: f32 = 6.0;
const BOOST_LYRICS: f32 = 3.0;

/// Search hit with song id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub song_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    song_id: Field,
    group_id: Field,
    title: Field,
    author: Field,
    tags: Field,
    lyrics: Field,
}

/// Tantivy search index for songs.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let song_id = schema_builder.add_text_field("song_id", STRING | STORED);
        let group_id = schema_builder.add_text_field("group_id", STRING);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let author = schema_builder.add_text_field("author", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let lyrics = schema_builder.add_text_field("lyrics", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            song_id,
            group_id,
            title,
            author,
            tags,
            lyrics,
        };

        // Try to open existing index or create new one
        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from songs.
    pub async fn rebuild(&self, songs: &[Song]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for song in songs {
            writer.add_document(self.create_document(song))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} songs", songs.len());
        Ok(())
    }

    /// Index a single song, replacing any previous copy.
    pub async fn index_song(&self, song: &Song) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.song_id, &song.id));
        writer.add_document(self.create_document(song))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a song from the index.
    pub async fn remove_song(&self, song_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.song_id, song_id));
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for songs matching the query, optionally within one group.
    pub fn search(
        &self,
        query_str: &str,
        group_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let field_queries = [
            (self.fields.title, BOOST_TITLE),
            (self.fields.tags, BOOST_TAGS),
            (self.fields.author, BOOST_AUTHOR),
            (self.fields.lyrics, BOOST_LYRICS),
        ];

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        if subqueries.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Invalid search query: {}",
                query_str
            )));
        }

        let text_query: Box<dyn Query> = Box::new(BooleanQuery::new(subqueries));
        let query: Box<dyn Query> = match group_id {
            Some(group_id) => {
                let group_term = TermQuery::new(
                    Term::from_field_text(self.fields.group_id, group_id),
                    IndexRecordOption::Basic,
                );
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, Box::new(group_term)),
                ]))
            }
            None => text_query,
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchResult> = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let song_id = doc.get_first(self.fields.song_id)?.as_str()?.to_string();
                Some(SearchResult { song_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, song: &Song) -> TantivyDocument {
        doc!(
            self.fields.song_id => song.id.clone(),
            self.fields.group_id => song.group_id.clone(),
            self.fields.title => song.title.clone(),
            self.fields.author => song.author.clone().unwrap_or_default(),
            self.fields.tags => song.tags.join(" "),
            self.fields.lyrics => song.lyrics.clone()
        )
    }
}
