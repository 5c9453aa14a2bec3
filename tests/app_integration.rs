use async_trait::async_trait;
use easiermongo::store::memory::MemoryEngine;
use easiermongo::{
    ClientOptions, Database, DocumentBuilder, EditOptions, Engine, Error, FieldType, Model,
    RawRecord, Schema, SchemaBuilder, StorageConfig,
};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

mod test_utils {
    use super::*;

    pub fn session_schema(ttl: u64) -> Schema {
        SchemaBuilder::new()
            .add_field(|f| f.set_name("user").set_type(FieldType::String).set_required(true))
            .add_field(|f| f.set_name("visits").set_type(FieldType::Number).set_default(0))
            .add_field(|f| f.set_name("nested").set_type(FieldType::Map))
            .add_field(|f| f.set_name("tags").set_type(FieldType::Array))
            .add_field(|f| f.set_name("expires").set_type(FieldType::Date).set_ttl(ttl))
            .to_schema()
            .unwrap()
    }

    pub fn model(schema: &Schema, make_cache: bool) -> Model {
        let engine = Arc::new(MemoryEngine::new(schema.clone()));
        Model::new("sessions", engine, schema, make_cache)
    }

    /// Forwards to an in-memory engine, counting every call.
    pub struct CountingEngine {
        pub inner: MemoryEngine,
        pub calls: AtomicUsize,
    }

    impl CountingEngine {
        pub fn new(schema: Schema) -> Self {
            Self {
                inner: MemoryEngine::new(schema),
                calls: AtomicUsize::new(0),
            }
        }

        fn count(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Engine for CountingEngine {
        async fn create(&self, record: RawRecord) -> easiermongo::Result<RawRecord> {
            self.count();
            self.inner.create(record).await
        }

        async fn find_by_id(&self, id: &str) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_by_id(id).await
        }

        async fn find_one(&self, query: &RawRecord) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_one(query).await
        }

        async fn find(&self, query: &RawRecord) -> easiermongo::Result<Vec<RawRecord>> {
            self.count();
            self.inner.find(query).await
        }

        async fn find_by_id_and_update(
            &self,
            id: &str,
            change: &RawRecord,
            options: EditOptions,
        ) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_by_id_and_update(id, change, options).await
        }

        async fn find_one_and_update(
            &self,
            query: &RawRecord,
            change: &RawRecord,
            options: EditOptions,
        ) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_one_and_update(query, change, options).await
        }

        async fn update_many(
            &self,
            query: &RawRecord,
            change: &RawRecord,
            options: EditOptions,
        ) -> easiermongo::Result<Vec<RawRecord>> {
            self.count();
            self.inner.update_many(query, change, options).await
        }

        async fn find_by_id_and_delete(
            &self,
            id: &str,
        ) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_by_id_and_delete(id).await
        }

        async fn find_one_and_delete(
            &self,
            query: &RawRecord,
        ) -> easiermongo::Result<Option<RawRecord>> {
            self.count();
            self.inner.find_one_and_delete(query).await
        }

        async fn delete_many(&self, query: &RawRecord) -> easiermongo::Result<Vec<RawRecord>> {
            self.count();
            self.inner.delete_many(query).await
        }
    }
}

use test_utils::{CountingEngine, model, session_schema};

#[test_log::test(tokio::test)]
async fn test_reads_populate_cache() {
    let sessions = model(&session_schema(60), true);
    let created = sessions
        .create(json!({"_id": "s1", "user": "ada"}))
        .await
        .unwrap();
    assert_eq!(created.field("visits"), Some(&json!(0)));
    assert_eq!(sessions.cache().get(&"s1".to_string()).await, Some(created));

    sessions.cache().clear().await;
    let found = sessions.find(json!({"user": "ada"})).await.unwrap().unwrap();
    assert_eq!(sessions.cache().get(&"s1".to_string()).await, Some(found));

    sessions.cache().clear().await;
    let all = sessions.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(sessions.cache().contains(&"s1".to_string()).await);
}

#[test_log::test(tokio::test)]
async fn test_cache_disabled_stays_empty() {
    let sessions = model(&session_schema(60), false);
    sessions
        .create(json!({"_id": "s1", "user": "ada"}))
        .await
        .unwrap();
    assert!(sessions.get("s1").await.unwrap().is_some());
    assert!(sessions.cache().is_empty().await);
}

#[test_log::test(tokio::test)]
async fn test_edit_only_caches_post_update_documents() {
    let sessions = model(&session_schema(60), true);
    sessions
        .create(json!({"_id": "s1", "user": "ada"}))
        .await
        .unwrap();

    // A pre-update snapshot never lands in the cache
    sessions.cache().clear().await;
    let before = sessions
        .edit("s1", json!({"visits": 1}), EditOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.revision(), 0);
    assert!(!sessions.cache().contains(&"s1".to_string()).await);

    let after = sessions
        .edit(
            "s1",
            easiermongo::builders::update::increment("visits", 2),
            EditOptions::returning_new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.revision(), 2);
    assert_eq!(after.field("visits"), Some(&json!(3)));
    assert_eq!(sessions.cache().get(&"s1".to_string()).await, Some(after));

    let missing = sessions
        .edit("nope", json!({"visits": 1}), EditOptions::returning_new())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[test_log::test(tokio::test)]
async fn test_deletes_evict_cache_and_expiry() {
    let sessions = model(&session_schema(60), true);
    for (id, user) in [("s1", "ada"), ("s2", "bob"), ("s3", "bob")] {
        sessions
            .create(json!({"_id": id, "user": user, "expires": "2026-10-16T12:00:00Z"}))
            .await
            .unwrap();
    }
    assert_eq!(sessions.expiry().pending().await.len(), 3);

    sessions.delete("s1").await.unwrap();
    assert!(!sessions.cache().contains(&"s1".to_string()).await);
    assert!(!sessions.expiry().is_pending("s1").await);
    assert!(sessions.get("s1").await.unwrap().is_none());

    sessions.delete_many(json!({"user": "bob"})).await.unwrap();
    assert!(sessions.cache().is_empty().await);
    assert!(sessions.expiry().pending().await.is_empty());

    // Deleting what is already gone is not an error
    sessions.delete("s1").await.unwrap();
    sessions.find_and_delete(json!({"user": "carol"})).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_expired_documents_leave_cache() {
    let sessions = model(&session_schema(1), true);
    assert!(sessions.expiry().is_running());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    sessions.on_expire(move |id, document| {
        sink.lock()
            .unwrap()
            .push((id.to_string(), document.is_some()));
    });
    // A panicking listener does not stop the others
    sessions.on_expire(|_, _| panic!("listener failure"));

    sessions
        .create(json!({"_id": "s1", "user": "ada", "expires": "2026-10-16T12:00:00Z"}))
        .await
        .unwrap();
    sessions
        .create(json!({"_id": "s2", "user": "bob"}))
        .await
        .unwrap();
    assert!(sessions.expiry().is_pending("s1").await);
    assert!(!sessions.expiry().is_pending("s2").await);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    info!(seen = ?seen.lock().unwrap(), "Expiry notifications");

    assert_eq!(*seen.lock().unwrap(), vec![("s1".to_string(), true)]);
    assert!(!sessions.cache().contains(&"s1".to_string()).await);
    assert!(sessions.cache().contains(&"s2".to_string()).await);
    // Expiry only touches the cache
    assert!(sessions.get("s1").await.unwrap().is_some());

    sessions.destroy();
    sessions.destroy();
    assert!(!sessions.expiry().is_running());
}

#[test_log::test(tokio::test)]
async fn test_unsetting_ttl_field_cancels_expiry() {
    let sessions = model(&session_schema(60), true);
    sessions
        .create(json!({"_id": "s1", "user": "ada", "expires": "2026-10-16T12:00:00Z"}))
        .await
        .unwrap();
    sessions
        .create(json!({"_id": "s2", "user": "bob", "expires": "2026-10-16T12:00:00Z"}))
        .await
        .unwrap();

    sessions
        .edit("s1", json!({"$unset": {"expires": ""}}), EditOptions::default())
        .await
        .unwrap();
    assert_eq!(sessions.expiry().pending().await, vec!["s2".to_string()]);

    sessions
        .edit("s1", json!({"expires": "2026-10-17T12:00:00Z"}), EditOptions::default())
        .await
        .unwrap();
    assert_eq!(
        sessions.expiry().pending().await,
        vec!["s2".to_string(), "s1".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn test_document_round_trip_and_copy() {
    #[derive(Deserialize)]
    struct Session {
        #[serde(rename = "_id")]
        id: String,
        user: String,
        tags: Vec<String>,
    }

    let sessions = model(&session_schema(60), true);
    let original = sessions
        .create(
            DocumentBuilder::new()
                .set_id("s1")
                .add_field("user", "ada")
                .add_field("tags", json!(["a", "b"])),
        )
        .await
        .unwrap();

    let fetched = sessions.get("s1").await.unwrap().unwrap();
    assert_eq!(fetched, original);
    let typed: Session = fetched.deserialize().unwrap();
    assert_eq!((typed.id.as_str(), typed.user.as_str()), ("s1", "ada"));
    assert_eq!(typed.tags, vec!["a", "b"]);

    assert!(matches!(
        original.insert_copy("s1").await,
        Err(Error::DuplicateId(id)) if id == "s1"
    ));
    assert!(matches!(
        original.insert_copy("").await,
        Err(Error::InvalidArgument { .. })
    ));

    let copy = original.insert_copy("s2").await.unwrap();
    assert_eq!(copy.id(), "s2");
    assert_eq!(copy.fields(), original.fields());

    copy.delete().await.unwrap();
    assert!(sessions.get("s2").await.unwrap().is_none());

    drop(sessions);
    assert!(matches!(original.delete().await, Err(Error::Detached)));
}

#[test_log::test(tokio::test)]
async fn test_update_merges_nested_fields() {
    let sessions = model(&session_schema(60), true);
    sessions
        .create(json!({"_id": "s1", "user": "ada", "nested": {"x": 1, "y": 2}}))
        .await
        .unwrap();

    let updated = sessions
        .update("s1", json!({"nested": {"x": 99}}), EditOptions::returning_new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.field("nested"), Some(&json!({"x": 99, "y": 2})));
    assert_eq!(updated.field("user"), Some(&json!("ada")));

    // `edit` replaces the nested object wholesale
    let replaced = sessions
        .edit("s1", json!({"nested": {"x": 1}}), EditOptions::returning_new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.field("nested"), Some(&json!({"x": 1})));

    let by_query = sessions
        .find_and_update(
            json!({"user": "ada"}),
            json!({"nested": {"z": 3}}),
            EditOptions::returning_new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_query.field("nested"), Some(&json!({"x": 1, "z": 3})));

    assert!(matches!(
        sessions
            .update("s1", json!({"$set": {"user": "x"}}), EditOptions::default())
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(sessions
        .update("nope", json!({"nested": {}}), EditOptions::default())
        .await
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
async fn test_update_many_returns_every_document() {
    let sessions = model(&session_schema(60), true);
    for (id, y) in [("s1", 1), ("s2", 2), ("s3", 3)] {
        sessions
            .create(json!({"_id": id, "user": "bob", "nested": {"y": y}}))
            .await
            .unwrap();
    }

    let updated = sessions
        .update_many(
            json!({"user": "bob"}),
            json!({"nested": {"x": 0}}),
            EditOptions::returning_new(),
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 3);
    for (document, y) in updated.iter().zip([1, 2, 3]) {
        assert_eq!(document.field("nested"), Some(&json!({"x": 0, "y": y})));
    }

    let edited = sessions
        .edit_many(
            json!({"user": "bob"}),
            easiermongo::builders::update::push("tags", "seen"),
            EditOptions::returning_new(),
        )
        .await
        .unwrap();
    assert!(edited.iter().all(|d| d.field("tags") == Some(&json!(["seen"]))));
}

#[test_log::test(tokio::test)]
async fn test_merging_updates_cache_post_update_documents() {
    let sessions = model(&session_schema(60), true);
    sessions
        .create(json!({"_id": "s1", "user": "ada", "nested": {"x": 1, "y": 2}}))
        .await
        .unwrap();

    // Starting from an empty cache, only the merged result gets cached
    sessions.cache().clear().await;
    let before = sessions
        .update("s1", json!({"nested": {"x": 99}}), EditOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.field("nested"), Some(&json!({"x": 1, "y": 2})));
    let cached = sessions.cache().get(&"s1".to_string()).await.unwrap();
    assert_eq!(cached.field("nested"), Some(&json!({"x": 99, "y": 2})));
    assert_eq!(cached.revision(), 1);

    let before = sessions
        .find_and_update(
            json!({"user": "ada"}),
            json!({"nested": {"z": 3}}),
            EditOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.field("nested"), Some(&json!({"x": 99, "y": 2})));
    let cached = sessions.cache().get(&"s1".to_string()).await.unwrap();
    assert_eq!(cached.field("nested"), Some(&json!({"x": 99, "y": 2, "z": 3})));

    sessions
        .create(json!({"_id": "s2", "user": "ada", "nested": {}}))
        .await
        .unwrap();
    let before = sessions
        .update_many(
            json!({"user": "ada"}),
            json!({"nested": {"w": 0}}),
            EditOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|d| d.field("nested").unwrap().get("w").is_none()));
    for id in ["s1", "s2"] {
        let cached = sessions.cache().get(&id.to_string()).await.unwrap();
        let stored = sessions.get(id).await.unwrap().unwrap();
        assert_eq!(cached.field("nested").unwrap()["w"], json!(0));
        assert_eq!(cached, stored);
    }
}

#[test_log::test(tokio::test)]
async fn test_edit_variants_leave_cached_entries_without_new() {
    let sessions = model(&session_schema(60), true);
    let mut created = Vec::new();
    for (id, user) in [("s1", "ada"), ("s2", "bob"), ("s3", "bob")] {
        created.push(
            sessions
                .create(json!({"_id": id, "user": user}))
                .await
                .unwrap(),
        );
    }

    sessions
        .edit("s1", json!({"visits": 1}), EditOptions::default())
        .await
        .unwrap();
    let before = sessions
        .find_and_edit(json!({"user": "ada"}), json!({"visits": 5}), EditOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.field("visits"), Some(&json!(1)));
    assert_eq!(
        sessions.cache().get(&"s1".to_string()).await.as_ref(),
        Some(&created[0])
    );

    let before = sessions
        .edit_many(json!({"user": "bob"}), json!({"visits": 3}), EditOptions::default())
        .await
        .unwrap();
    assert_eq!(before.len(), 2);
    for document in &created[1..] {
        assert_eq!(
            sessions.cache().get(&document.id().to_string()).await.as_ref(),
            Some(document)
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_edit_variants_cache_new_documents() {
    let sessions = model(&session_schema(60), true);
    for (id, user) in [("s1", "ada"), ("s2", "bob"), ("s3", "bob")] {
        sessions
            .create(json!({"_id": id, "user": user}))
            .await
            .unwrap();
    }

    let after = sessions
        .find_and_edit(
            json!({"user": "ada"}),
            json!({"visits": 7}),
            EditOptions::returning_new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.field("visits"), Some(&json!(7)));
    assert_eq!(sessions.cache().get(&"s1".to_string()).await, Some(after));

    let after = sessions
        .edit_many(
            json!({"user": "bob"}),
            json!({"visits": 3}),
            EditOptions::returning_new(),
        )
        .await
        .unwrap();
    assert_eq!(after.len(), 2);
    for document in after {
        assert_eq!(document.field("visits"), Some(&json!(3)));
        assert_eq!(
            sessions.cache().get(&document.id().to_string()).await,
            Some(document)
        );
    }

    assert!(sessions
        .find_and_edit(json!({"user": "carol"}), json!({"visits": 1}), EditOptions::default())
        .await
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
async fn test_zero_ttl_never_tracks_documents() {
    let sessions = model(&session_schema(0), true);
    assert_eq!(sessions.ttl(), None);
    assert!(!sessions.expiry().is_running());

    for id in ["s1", "s2", "s3"] {
        sessions
            .create(json!({"_id": id, "user": "ada", "expires": "2026-10-16T12:00:00Z"}))
            .await
            .unwrap();
    }
    assert!(sessions.expiry().pending().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_incrementing_ttl_field_refreshes_expiry() {
    let sessions = model(&session_schema(60), true);
    for id in ["s1", "s2"] {
        sessions
            .create(json!({"_id": id, "user": "ada", "expires": 1_792_152_000_000_i64}))
            .await
            .unwrap();
    }

    sessions
        .edit(
            "s1",
            easiermongo::builders::update::increment("expires", 60_000),
            EditOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        sessions.expiry().pending().await,
        vec!["s2".to_string(), "s1".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn test_invalid_arguments_fail_before_engine() {
    let schema = session_schema(60);
    let engine = Arc::new(CountingEngine::new(schema.clone()));
    let sessions = Model::new("sessions", engine.clone(), &schema, true);

    assert!(matches!(sessions.get("").await, Err(Error::InvalidArgument { .. })));
    assert!(matches!(
        sessions.edit("", json!({}), EditOptions::default()).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(sessions.delete("").await, Err(Error::InvalidArgument { .. })));
    assert!(matches!(
        sessions.find(json!("not a query")).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        sessions.create(json!({"_id": 42, "user": "ada"})).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);

    sessions.get("s1").await.unwrap();
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn test_failed_create_rolls_back_cache() {
    let sessions = model(&session_schema(60), true);

    let missing_user = sessions.create(json!({"_id": "s1"})).await;
    assert!(matches!(missing_user, Err(Error::Validation(_))));
    assert!(!sessions.cache().contains(&"s1".to_string()).await);

    let original = sessions
        .create(json!({"_id": "s1", "user": "ada"}))
        .await
        .unwrap();
    let duplicate = sessions.create(json!({"_id": "s1", "user": "eve"})).await;
    assert!(matches!(duplicate, Err(Error::Engine(_))));
    assert_eq!(sessions.cache().get(&"s1".to_string()).await, Some(original));
}

#[test_log::test(tokio::test)]
async fn test_database_loads_schema_files() {
    let dir = tempfile::tempdir().unwrap();
    let schemas = dir.path().join("schemas");
    fs::create_dir_all(&schemas).unwrap();
    fs::write(
        schemas.join("users.yaml"),
        "fields:\n  - name: email\n    type: STRING\n    required: true\n",
    )
    .unwrap();
    fs::write(schemas.join("ignored.yaml"), "fields: []\n").unwrap();

    let options = ClientOptions {
        use_files: true,
        schema_folder_path: Some(schemas.to_string_lossy().into_owned()),
        ignored_files: vec!["ignored.yaml".to_string()],
        storage: StorageConfig::Disk {
            path: Some(dir.path().join("store").to_string_lossy().into_owned()),
        },
        ..ClientOptions::default()
    };

    let db = Database::connect(options).await.unwrap();
    assert!(db.store().is_persistent());
    assert!(db.model("ignored").is_none());

    let users = db.model("users").unwrap();
    let created = users
        .create(json!({"_id": "u1", "email": "ada@example.com", "extra": true}))
        .await
        .unwrap();
    // Strict schemas drop undeclared fields
    assert!(created.field("extra").is_none());
    assert!(matches!(
        users.create(json!({"_id": "u2"})).await,
        Err(Error::Validation(_))
    ));

    let fetched = users.get("u1").await.unwrap().unwrap();
    assert_eq!(fetched.field("email"), Some(&json!("ada@example.com")));

    db.disconnect();
    assert!(db.models().is_empty());
}
