#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream};
use pdf_index::embedding::{EmbedError, EmbeddingModel, ModelLoader};

pub const DIMS: usize = 8;

/// A PDF with one line of Courier text per page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
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
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
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
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// What the shared model state has observed across every worker.
#[derive(Default)]
pub struct Observed {
    pub loads: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Observed {
    pub fn sorted_batch_sizes(&self) -> Vec<usize> {
        let mut sizes = self.batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        sizes
    }
}

/// Loader for a deterministic hashing model.
pub struct HashLoader {
    pub observed: Arc<Observed>,
    /// Fail every encode call whose batch contains this text.
    pub fail_on: Option<String>,
    /// Time spent in each encode call.
    pub delay: Duration,
}

impl HashLoader {
    pub fn new() -> Self {
        Self {
            observed: Arc::new(Observed::default()),
            fail_on: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }
}

impl ModelLoader for HashLoader {
    fn model_name(&self) -> &str {
        "hash-model"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn load(&self, _worker_id: usize) -> Result<Box<dyn EmbeddingModel>, EmbedError> {
        self.observed.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HashModel {
            observed: Arc::clone(&self.observed),
            fail_on: self.fail_on.clone(),
            delay: self.delay,
        }))
    }
}

struct HashModel {
    observed: Arc<Observed>,
    fail_on: Option<String>,
    delay: Duration,
}

impl EmbeddingModel for HashModel {
    fn model_name(&self) -> &str {
        "hash-model"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn encode(&mut self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        let now = self.observed.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.observed.peak.fetch_max(now, Ordering::SeqCst);
        self.observed.batch_sizes.lock().unwrap().push(texts.len());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.observed.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(bad) = &self.fail_on {
            if texts.iter().any(|t| t.contains(bad.as_str())) {
                return Err(EmbedError::Inference(format!("refusing {:?}", bad)));
            }
        }
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

/// Deterministic unit-length vector for `text`.
pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v: Vec<f32> = (0..DIMS)
        .map(|i| {
            let mut h = DefaultHasher::new();
            (text, i).hash(&mut h);
            (h.finish() % 1000) as f32 / 1000.0 + 0.001
        })
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}
