//! Secret storage for workflow-scoped credentials.
//!
//! Values are stored pre-encrypted by the caller — this module only moves
//! ciphertext in and out of Postgres, it never sees a plaintext secret.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::SecretRow, DbError};

pub async fn put_secret(
    pool: &PgPool,
    workflow_id: Uuid,
    key: &str,
    encrypted_value: &str,
) -> Result<SecretRow, DbError> {
    let id = Uuid::new_v4();

    let row = sqlx::query_as::<_, SecretRow>(
        r#"
        INSERT INTO secrets (id, workflow_id, key, encrypted_value)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (workflow_id, key) DO UPDATE SET encrypted_value = EXCLUDED.encrypted_value
        RETURNING id, workflow_id, key, encrypted_value
        "#,
    )
    .bind(id)
    .bind(workflow_id)
    .bind(key)
    .bind(encrypted_value)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn list_secrets(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<SecretRow>, DbError> {
    let rows = sqlx::query_as::<_, SecretRow>(
        r#"SELECT id, workflow_id, key, encrypted_value FROM secrets WHERE workflow_id = $1"#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_secret(pool: &PgPool, workflow_id: Uuid, key: &str) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM secrets WHERE workflow_id = $1 AND key = $2")
        .bind(workflow_id)
        .bind(key)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
