use super::estimate_token_count as estimate_token_count_impl;
use super::*;

#[test]
fn estimate_token_count() {
    assert_eq!(estimate_token_count_impl("hello world"), 2);
    assert_eq!(estimate_token_count_impl("This is a test."), 5);
    assert_eq!(estimate_token_count_impl(""), 0);
}

#[test]
fn small_body_is_single_chunk() {
    let config = ChunkingConfig::default();
    let body = "A short newsletter issue about gradient descent.";

    let chunks = chunk_email_body(body, &config).expect("chunking should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].content, body);
}

#[test]
fn empty_body_yields_no_chunks() {
    let config = ChunkingConfig::default();

    let chunks = chunk_email_body("   \n  ", &config).expect("chunking should succeed");

    assert!(chunks.is_empty());
}

#[test]
fn long_body_splits_at_paragraphs() {
    let config = ChunkingConfig::default();
    let paragraph = "Machine learning newsletters repeat themselves quite a bit. ".repeat(20);
    let body = (0..12)
        .map(|i| format!("Issue section {}: {}", i, paragraph))
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks = chunk_email_body(&body, &config).expect("chunking should succeed");

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.token_count <= config.max_chunk_size + config.overlap_size);
    }
    // Indices are sequential after post-processing
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
    }
}

#[test]
fn oversized_paragraph_splits_at_sentences() {
    let config = ChunkingConfig {
        target_chunk_size: 120,
        max_chunk_size: 200,
        min_chunk_size: 50,
        overlap_size: 0,
        sentence_boundary_splitting: true,
    };
    let body = "This sentence talks about embeddings in quite some detail. ".repeat(60);

    let chunks = chunk_email_body(&body, &config).expect("chunking should succeed");

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.token_count <= config.max_chunk_size);
    }
}

#[test]
fn adjacent_chunks_share_overlap() {
    let config = ChunkingConfig {
        target_chunk_size: 120,
        max_chunk_size: 200,
        min_chunk_size: 50,
        overlap_size: 20,
        sentence_boundary_splitting: true,
    };
    let body = (0..10)
        .map(|i| {
            format!(
                "Paragraph {} has enough words to matter for the splitter and keeps going on. ",
                i
            )
            .repeat(4)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks = chunk_email_body(&body, &config).expect("chunking should succeed");
    assert!(chunks.len() > 1);

    // Second chunk starts with the tail of the first
    let first_tail = chunks[0]
        .content
        .split_whitespace()
        .rev()
        .take(5)
        .collect::<Vec<_>>();
    let second_head: Vec<_> = chunks[1].content.split_whitespace().take(200).collect();
    assert!(first_tail.iter().all(|word| second_head.contains(word)));
}

#[test]
fn contextual_chunk_carries_subject_and_sender() {
    let chunk = create_contextual_chunk(
        "The kernel trick maps inputs into a higher-dimensional space.",
        "Weekly ML Digest #42",
        "digest@example.com",
        3,
    );

    assert!(chunk.content.starts_with("Subject: Weekly ML Digest #42\n"));
    assert!(chunk.content.contains("From: digest@example.com"));
    assert!(chunk.content.contains("kernel trick"));
    assert_eq!(chunk.chunk_index, 3);
    assert!(chunk.token_count > 0);
}
