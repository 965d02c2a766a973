use loomnote_core::db::open_db_in_memory;
use loomnote_core::{
    ChunkListQuery, ChunkRepository, ChunkService, ChunkServiceError, NewChunkRequest,
    SqliteChunkRepository, SqliteTextRepository, TextPageQuery, TextPatch, TextStatus,
};
use uuid::Uuid;

fn service(conn: &rusqlite::Connection) -> ChunkService<SqliteChunkRepository<'_>, SqliteTextRepository<'_>> {
    ChunkService::new(
        SqliteChunkRepository::new(conn),
        SqliteTextRepository::new(conn),
    )
}

#[test]
fn create_and_get_text_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Notes", "first body").unwrap();
    let loaded = service.get_text(text.id).unwrap().unwrap();
    assert_eq!(loaded.title, "Notes");
    assert_eq!(loaded.content, "first body");
    assert_eq!(loaded.status, TextStatus::Pending);
    assert!(loaded.created_at > 0);
}

#[test]
fn create_text_rejects_blank_content() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let err = service.create_text("Empty", "   ").unwrap_err();
    assert!(matches!(err, ChunkServiceError::BlankTextContent));
}

#[test]
fn update_text_and_status() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Draft", "body").unwrap();
    service
        .update_text(
            text.id,
            &TextPatch {
                title: Some("Final".to_string()),
                ..TextPatch::default()
            },
        )
        .unwrap();
    service
        .set_text_status(text.id, TextStatus::Completed)
        .unwrap();

    let loaded = service.get_text(text.id).unwrap().unwrap();
    assert_eq!(loaded.title, "Final");
    assert_eq!(loaded.status, TextStatus::Completed);
}

#[test]
fn update_missing_text_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let missing = Uuid::new_v4();
    let err = service
        .update_text(missing, &TextPatch::default())
        .unwrap_err();
    assert!(matches!(err, ChunkServiceError::TextNotFound(id) if id == missing));
}

#[test]
fn list_texts_paginates_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    for index in 0..3 {
        service
            .create_text(format!("T{index}"), format!("body {index}"))
            .unwrap();
    }

    let page = service
        .list_texts(&TextPageQuery {
            page: 1,
            page_size: 2,
        })
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.texts.len(), 2);

    let rest = service
        .list_texts(&TextPageQuery {
            page: 2,
            page_size: 2,
        })
        .unwrap();
    assert_eq!(rest.texts.len(), 1);
}

#[test]
fn create_chunk_appends_root_sequence_numbers() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let first = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "alpha".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();
    let second = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "beta".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();

    assert_eq!(first.sequence_number, Some(0));
    assert_eq!(second.sequence_number, Some(1));
    assert_eq!(first.indent_level, 0);
}

#[test]
fn create_child_chunk_derives_indent_and_sequence() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let parent = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "parent".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();

    let child_a = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "child a".to_string(),
            parent_chunk_id: Some(parent.id),
            ..NewChunkRequest::default()
        })
        .unwrap();
    let child_b = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "child b".to_string(),
            parent_chunk_id: Some(parent.id),
            ..NewChunkRequest::default()
        })
        .unwrap();

    assert_eq!(child_a.indent_level, 1);
    assert_eq!(child_a.sequence_number, Some(0));
    assert_eq!(child_b.sequence_number, Some(1));
}

#[test]
fn create_chunk_rejects_unknown_text_and_parent() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let missing_text = Uuid::new_v4();
    let err = service
        .create_chunk(&NewChunkRequest {
            text_id: missing_text,
            content: "orphan".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap_err();
    assert!(matches!(err, ChunkServiceError::TextNotFound(id) if id == missing_text));

    let text = service.create_text("Doc", "body").unwrap();
    let missing_parent = Uuid::new_v4();
    let err = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "child".to_string(),
            parent_chunk_id: Some(missing_parent),
            ..NewChunkRequest::default()
        })
        .unwrap_err();
    assert!(matches!(err, ChunkServiceError::ParentNotFound(id) if id == missing_parent));
}

#[test]
fn chunk_metadata_roundtrips_as_json() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let mut request = NewChunkRequest {
        text_id: text.id,
        content: "annotated".to_string(),
        ..NewChunkRequest::default()
    };
    request
        .metadata
        .insert("source".to_string(), serde_json::json!("import"));
    request
        .metadata
        .insert("confidence".to_string(), serde_json::json!(0.9));

    let chunk = service.create_chunk(&request).unwrap();
    let loaded = service.get_chunk(chunk.id).unwrap().unwrap();
    assert_eq!(loaded.metadata, request.metadata);
}

#[test]
fn update_chunk_content_overwrites_body() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let chunk = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "draft".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();

    service.update_chunk_content(chunk.id, "final").unwrap();
    let loaded = service.get_chunk(chunk.id).unwrap().unwrap();
    assert_eq!(loaded.content, "final");
}

#[test]
fn delete_chunk_cascades_to_descendants() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let root = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "root".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();
    let child = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "child".to_string(),
            parent_chunk_id: Some(root.id),
            ..NewChunkRequest::default()
        })
        .unwrap();
    let grandchild = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "grandchild".to_string(),
            parent_chunk_id: Some(child.id),
            ..NewChunkRequest::default()
        })
        .unwrap();

    service.delete_chunk(root.id).unwrap();

    assert!(service.get_chunk(root.id).unwrap().is_none());
    assert!(service.get_chunk(child.id).unwrap().is_none());
    assert!(service.get_chunk(grandchild.id).unwrap().is_none());
}

#[test]
fn delete_text_cascades_to_owned_chunks() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let chunk = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "owned".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();

    service.delete_text(text.id).unwrap();

    assert!(service.get_text(text.id).unwrap().is_none());
    assert!(service.get_chunk(chunk.id).unwrap().is_none());
}

#[test]
fn text_detail_lists_chunks_in_sibling_order() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let text = service.create_text("Doc", "body").unwrap();
    let first = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "one".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();
    let second = service
        .create_chunk(&NewChunkRequest {
            text_id: text.id,
            content: "two".to_string(),
            ..NewChunkRequest::default()
        })
        .unwrap();

    let detail = service.text_detail(text.id).unwrap();
    assert_eq!(detail.text.id, text.id);
    assert_eq!(detail.chunks.len(), 2);
    assert_eq!(detail.chunks[0].id, first.id);
    assert_eq!(detail.chunks[1].id, second.id);
}

#[test]
fn list_chunks_returns_empty_set_for_unknown_filters() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteChunkRepository::new(&conn);

    let chunks = repo
        .list_chunks(&ChunkListQuery {
            text_id: Some(Uuid::new_v4()),
            ..ChunkListQuery::default()
        })
        .unwrap();
    assert!(chunks.is_empty());
}
