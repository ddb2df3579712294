use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, types::Json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{ADMIN_ROLE, Document};

/// Collection
///
/// The three document collections. Each maps to one table holding `(_id, doc)` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Info,
    Users,
    SelectedClasses,
}

impl Collection {
    /// Table name in the store. Only these constants are ever interpolated into SQL.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Info => "info",
            Collection::Users => "users",
            Collection::SelectedClasses => "selectedclasses",
        }
    }
}

/// StoreError
///
/// A failure of the underlying document store. Never shown to clients verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document store unavailable")]
    Unavailable,
}

/// InsertOutcome
///
/// Result of an insert into a collection guarded by a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    /// A record with the same unique key already exists; nothing was written.
    Duplicate,
}

/// Repository Trait
///
/// The contract between the route handlers and the document store. One method per store
/// operation the API performs; handlers never see SQL.
///
/// Uniqueness (one user per `email`, one selection per external `id`) is the store's job:
/// implementations must make the duplicate check and the write a single atomic step.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Info ---
    async fn list_info(&self) -> Result<Vec<Document>, StoreError>;

    // --- Users ---
    async fn list_users(&self) -> Result<Vec<Document>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Document>, StoreError>;
    async fn insert_user(&self, user: Map<String, Value>) -> Result<InsertOutcome, StoreError>;
    /// Sets `role` to `"admin"`. Returns the number of records modified: 0 when the id is
    /// unknown or the user already is an admin.
    async fn promote_user(&self, id: Uuid) -> Result<u64, StoreError>;

    // --- Selected Classes ---
    async fn list_selected_classes(&self) -> Result<Vec<Document>, StoreError>;
    async fn insert_selected_class(
        &self,
        class: Map<String, Value>,
    ) -> Result<InsertOutcome, StoreError>;
    /// Returns the number of records deleted (0 or 1).
    async fn delete_selected_class(&self, id: Uuid) -> Result<u64, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the store across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

/// PostgresRepository
///
/// Document store on top of Postgres JSONB. Every collection is a table
/// `(_id UUID, doc JSONB, created_at TIMESTAMPTZ)`; the unique keys are expression indexes
/// over the document, so duplicate inserts are rejected by the database itself.
pub struct PostgresRepository {
    pool: PgPool,
}

// Applied in order by `ensure_schema`. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS info (
        _id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        _id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users ((doc->>'email'))"#,
    r#"CREATE TABLE IF NOT EXISTS selectedclasses (
        _id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS selectedclasses_id_key ON selectedclasses ((doc->'id'))"#,
];

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ensure_schema
    ///
    /// Creates the collection tables and their unique indexes if they do not exist yet.
    /// Safe to call on every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let sql = format!(
            "SELECT _id, doc FROM {} ORDER BY created_at, _id",
            collection.table()
        );
        let rows: Vec<(Uuid, Json<Map<String, Value>>)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(fields))| Document { id, fields })
            .collect())
    }

    /// Inserts a document, mapping a unique-index violation to `InsertOutcome::Duplicate`.
    async fn insert(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<InsertOutcome, StoreError> {
        let id = Uuid::new_v4();
        let sql = format!("INSERT INTO {} (_id, doc) VALUES ($1, $2)", collection.table());

        match sqlx::query(&sql)
            .bind(id)
            .bind(Json(fields))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(InsertOutcome::Inserted(id)),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!(table = collection.table(), "insert rejected by unique index");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_info(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::Info).await
    }

    async fn list_users(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::Users).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Document>, StoreError> {
        let row: Option<(Uuid, Json<Map<String, Value>>)> =
            sqlx::query_as("SELECT _id, doc FROM users WHERE doc->>'email' = $1 LIMIT 1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, Json(fields))| Document { id, fields }))
    }

    async fn insert_user(&self, user: Map<String, Value>) -> Result<InsertOutcome, StoreError> {
        self.insert(Collection::Users, user).await
    }

    /// The `IS DISTINCT FROM` guard makes an already-admin user count as "not modified".
    async fn promote_user(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"UPDATE users
               SET doc = jsonb_set(doc, '{role}', '"admin"'::jsonb)
               WHERE _id = $1 AND doc->>'role' IS DISTINCT FROM 'admin'"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_selected_classes(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::SelectedClasses).await
    }

    async fn insert_selected_class(
        &self,
        class: Map<String, Value>,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert(Collection::SelectedClasses, class).await
    }

    async fn delete_selected_class(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM selectedclasses WHERE _id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// --- In-Memory ---

/// MemoryRepository
///
/// In-process document store with the same unique-key semantics as the Postgres one.
/// Used by the test suites, and as the stand-in when the real store cannot even be
/// configured at startup (`new_failing`), so that requests fail individually.
#[derive(Default)]
pub struct MemoryRepository {
    info: RwLock<Vec<Document>>,
    users: RwLock<Vec<Document>>,
    selected_classes: RwLock<Vec<Document>>,
    /// When true, every operation returns `StoreError::Unavailable`.
    pub should_fail: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn collection(&self, collection: Collection) -> &RwLock<Vec<Document>> {
        match collection {
            Collection::Info => &self.info,
            Collection::Users => &self.users,
            Collection::SelectedClasses => &self.selected_classes,
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.should_fail {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// seed
    ///
    /// Writes a document directly, bypassing the unique keys. Lets tests and local
    /// setups create records the API would not (e.g. an initial admin).
    pub async fn seed(&self, collection: Collection, fields: Map<String, Value>) -> Uuid {
        let document = Document::new(fields);
        let id = document.id;
        self.collection(collection).write().await.push(document);
        id
    }

    /// Number of documents currently stored in `collection`.
    pub async fn count(&self, collection: Collection) -> usize {
        self.collection(collection).read().await.len()
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        self.check()?;
        Ok(self.collection(collection).read().await.clone())
    }

    // The write lock is held across the duplicate scan and the push.
    async fn insert_unique(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        let mut documents = self.collection(collection).write().await;

        if let Some(key) = unique_key(collection, &fields) {
            let taken = documents
                .iter()
                .any(|existing| unique_key(collection, &existing.fields).as_ref() == Some(&key));
            if taken {
                return Ok(InsertOutcome::Duplicate);
            }
        }

        let document = Document::new(fields);
        let id = document.id;
        documents.push(document);
        Ok(InsertOutcome::Inserted(id))
    }
}

/// Mirrors the Postgres expression indexes: `doc->>'email'` for users (JSON null and a
/// missing key both mean "no key"), `doc->'id'` for selections (only a missing key does).
fn unique_key(collection: Collection, fields: &Map<String, Value>) -> Option<Value> {
    match collection {
        Collection::Users => match fields.get("email") {
            None | Some(Value::Null) => None,
            Some(Value::String(email)) => Some(Value::String(email.clone())),
            Some(other) => Some(Value::String(other.to_string())),
        },
        Collection::SelectedClasses => fields.get("id").cloned(),
        Collection::Info => None,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_info(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::Info).await
    }

    async fn list_users(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::Users).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|user| user.email() == Some(email))
            .cloned())
    }

    async fn insert_user(&self, user: Map<String, Value>) -> Result<InsertOutcome, StoreError> {
        self.insert_unique(Collection::Users, user).await
    }

    async fn promote_user(&self, id: Uuid) -> Result<u64, StoreError> {
        self.check()?;
        let mut users = self.users.write().await;

        match users.iter_mut().find(|user| user.id == id) {
            Some(user) if !user.is_admin() => {
                user.fields
                    .insert("role".to_string(), Value::String(ADMIN_ROLE.to_string()));
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn list_selected_classes(&self) -> Result<Vec<Document>, StoreError> {
        self.list(Collection::SelectedClasses).await
    }

    async fn insert_selected_class(
        &self,
        class: Map<String, Value>,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert_unique(Collection::SelectedClasses, class).await
    }

    async fn delete_selected_class(&self, id: Uuid) -> Result<u64, StoreError> {
        self.check()?;
        let mut classes = self.selected_classes.write().await;
        let before = classes.len();
        classes.retain(|class| class.id != id);
        Ok((before - classes.len()) as u64)
    }
}
