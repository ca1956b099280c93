//! Model-service collaborators, each built on first use

use codeweave_core::{
    AnswerGenerator, Embedder, HttpAnswerGenerator, HttpEmbedder, HttpQueryOrchestrator,
    HttpReranker, HttpSummarizer, LLMServiceConfig, Lazy, QueryOrchestrator, Reranker, Summarizer,
};
use std::sync::Arc;

pub fn summarizer(config: &LLMServiceConfig) -> Arc<dyn Summarizer> {
    let config = config.clone();
    Arc::new(Lazy::<dyn Summarizer>::new("summarizer", move || {
        Ok(Arc::new(HttpSummarizer::from_config(config.clone())?) as Arc<dyn Summarizer>)
    }))
}

pub fn embedder(config: &LLMServiceConfig) -> Arc<dyn Embedder> {
    let config = config.clone();
    Arc::new(Lazy::<dyn Embedder>::new("embedder", move || {
        Ok(Arc::new(HttpEmbedder::from_config(config.clone())?) as Arc<dyn Embedder>)
    }))
}

pub fn reranker(config: &LLMServiceConfig) -> Arc<dyn Reranker> {
    let config = config.clone();
    Arc::new(Lazy::<dyn Reranker>::new("reranker", move || {
        Ok(Arc::new(HttpReranker::from_config(config.clone())?) as Arc<dyn Reranker>)
    }))
}

pub fn orchestrator(config: &LLMServiceConfig) -> Arc<dyn QueryOrchestrator> {
    let config = config.clone();
    Arc::new(Lazy::<dyn QueryOrchestrator>::new("orchestrator", move || {
        Ok(Arc::new(HttpQueryOrchestrator::from_config(config.clone())?)
            as Arc<dyn QueryOrchestrator>)
    }))
}

pub fn answer_generator(config: &LLMServiceConfig) -> Arc<dyn AnswerGenerator> {
    let config = config.clone();
    Arc::new(Lazy::<dyn AnswerGenerator>::new("answer", move || {
        Ok(Arc::new(HttpAnswerGenerator::from_config(config.clone())?)
            as Arc<dyn AnswerGenerator>)
    }))
}
