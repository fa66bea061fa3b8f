use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;

use crate::embeddings::Embedder;
use crate::error::ProviderError;
use crate::models::ChatMessage;
use crate::traits::ChatModel;

/// In-memory PDF with one Courier text line per page; empty strings give blank pages.
pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}

type Reply = dyn Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync;

/// Chat model driven by a closure; records every request it receives.
pub(crate) struct ScriptedChatModel {
    reply: Box<Reply>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub(crate) fn new(
        reply: impl Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self::new(|_| {
            Err(ProviderError::Status {
                provider: "scripted".to_string(),
                status: 503,
                body: "unavailable".to_string(),
            })
        })
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.lock().expect("calls lock").push(messages.to_vec());
        (self.reply)(messages)
    }
}

/// Two-dimensional embedder that scores text by mentions of the first or second page.
pub(crate) struct PageKeywordEmbedder;

const SECOND_PAGE: [&str; 2] = ["page 2", "beta"];
const FIRST_PAGE: [&str; 3] = ["page 1", "alpha", "first"];

fn mentions(text: &str, needles: &[&str]) -> f32 {
    needles.iter().filter(|needle| text.contains(*needle)).count() as f32
}

#[async_trait]
impl Embedder for PageKeywordEmbedder {
    fn model_name(&self) -> &str {
        "page-keywords"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                vec![mentions(&lowered, &SECOND_PAGE), mentions(&lowered, &FIRST_PAGE)]
            })
            .collect())
    }
}
