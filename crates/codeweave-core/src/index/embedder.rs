//! Background embedding consumer fed through a bounded queue

use crate::error::{Error, Result};
use crate::llm::Embedder;
use crate::vector::is_null_vector;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum EmbedMessage {
    Item { id: String, text: String },
    /// Terminates the consumer once everything before it is flushed
    Done,
}

/// Counters for one pipeline lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingReport {
    pub embedded: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Producer side of the queue
#[derive(Clone)]
pub struct EmbeddingSender {
    tx: mpsc::Sender<EmbedMessage>,
}

impl EmbeddingSender {
    /// Enqueue one snippet text, waiting while the queue is full.
    ///
    /// Returns `false` when the consumer is gone.
    pub async fn send(&self, id: impl Into<String>, text: impl Into<String>) -> bool {
        self.tx
            .send(EmbedMessage::Item {
                id: id.into(),
                text: text.into(),
            })
            .await
            .is_ok()
    }
}

type ConsumerOutput = (HashMap<String, Vec<f32>>, EmbeddingReport);

pub struct EmbeddingPipeline {
    tx: mpsc::Sender<EmbedMessage>,
    consumer: JoinHandle<ConsumerOutput>,
}

impl EmbeddingPipeline {
    /// Start the consumer task
    pub fn spawn(embedder: Arc<dyn Embedder>, batch_size: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer = tokio::spawn(consume(embedder, rx, batch_size.max(1)));
        Self { tx, consumer }
    }

    pub fn sender(&self) -> EmbeddingSender {
        EmbeddingSender {
            tx: self.tx.clone(),
        }
    }

    /// Send the sentinel and wait for the consumer to flush
    pub async fn finish(self) -> Result<ConsumerOutput> {
        // a closed channel means the consumer already stopped
        let _ = self.tx.send(EmbedMessage::Done).await;
        drop(self.tx);
        self.consumer.await.map_err(Error::from)
    }
}

async fn consume(
    embedder: Arc<dyn Embedder>,
    mut rx: mpsc::Receiver<EmbedMessage>,
    batch_size: usize,
) -> ConsumerOutput {
    let mut vectors = HashMap::new();
    let mut report = EmbeddingReport::default();

    loop {
        let mut batch = match rx.recv().await {
            Some(EmbedMessage::Item { id, text }) => vec![(id, text)],
            Some(EmbedMessage::Done) | None => break,
        };

        let mut done = false;
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(EmbedMessage::Item { id, text }) => batch.push((id, text)),
                Ok(EmbedMessage::Done) => {
                    done = true;
                    break;
                }
                Err(_) => break,
            }
        }

        embed_batch(embedder.as_ref(), batch, &mut vectors, &mut report).await;
        if done {
            break;
        }
    }

    tracing::debug!(
        embedded = report.embedded,
        failed = report.failed,
        batches = report.batches,
        "embedding consumer finished"
    );
    (vectors, report)
}

async fn embed_batch(
    embedder: &dyn Embedder,
    batch: Vec<(String, String)>,
    vectors: &mut HashMap<String, Vec<f32>>,
    report: &mut EmbeddingReport,
) {
    report.batches += 1;
    let (ids, texts): (Vec<String>, Vec<String>) = batch.into_iter().unzip();

    match embedder.embed_batch(&texts).await {
        Ok(embeddings) if embeddings.len() == ids.len() => {
            for (id, embedding) in ids.into_iter().zip(embeddings) {
                if is_null_vector(&embedding) {
                    report.failed += 1;
                } else {
                    report.embedded += 1;
                    vectors.insert(id, embedding);
                }
            }
        }
        Ok(embeddings) => {
            tracing::warn!(
                expected = ids.len(),
                got = embeddings.len(),
                "embedding batch size mismatch, dropping batch"
            );
            report.failed += ids.len();
        }
        Err(e) => {
            tracing::warn!("embedding batch failed: {}", e);
            report.failed += ids.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records batch sizes; texts containing "fail" get a zero vector
    struct Recording {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Embedder for Recording {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.embed_batch(&[text.to_string()]).await?.remove(0))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("fail") {
                        vec![0.0, 0.0]
                    } else {
                        vec![t.len() as f32, 1.0]
                    }
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_pipeline_embeds_everything_sent() {
        let embedder = Arc::new(Recording {
            batches: Mutex::new(Vec::new()),
        });
        let pipeline = EmbeddingPipeline::spawn(embedder.clone(), 3, 2);
        let sender = pipeline.sender();
        for i in 0..7 {
            assert!(sender.send(format!("id{}", i), format!("text {}", i)).await);
        }
        assert!(sender.send("bad", "fail").await);
        drop(sender);

        let (vectors, report) = pipeline.finish().await.unwrap();
        assert_eq!(vectors.len(), 7);
        assert_eq!(report.embedded, 7);
        assert_eq!(report.failed, 1);
        assert!(!vectors.contains_key("bad"));

        let batches = embedder.batches.lock().unwrap().clone();
        assert_eq!(batches.iter().sum::<usize>(), 8);
        assert!(batches.iter().all(|&n| n <= 3));
    }

    #[tokio::test]
    async fn test_finish_without_items() {
        let embedder = Arc::new(Recording {
            batches: Mutex::new(Vec::new()),
        });
        let pipeline = EmbeddingPipeline::spawn(embedder.clone(), 4, 4);
        let (vectors, report) = pipeline.finish().await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(report, EmbeddingReport::default());
        assert!(embedder.batches.lock().unwrap().is_empty());
    }
}
