use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};

use super::{Database, StoreError};

/// Listing id to description vector. Vectors are raw little-endian f32 blobs.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    db: Database,
}

impl EmbeddingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn upsert(&self, listing_id: i64, vector: &[f32]) -> Result<(), StoreError> {
        let conn = self.db.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (listing_id, embedding) VALUES (?1, ?2)",
            params![listing_id, encode_vector(vector)],
        )?;
        Ok(())
    }

    /// Upsert all pairs in one transaction.
    pub fn upsert_many(&self, pairs: &[(i64, Vec<f32>)]) -> Result<usize, StoreError> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO embeddings (listing_id, embedding) VALUES (?1, ?2)",
            )?;
            for (listing_id, vector) in pairs {
                stmt.execute(params![listing_id, encode_vector(vector)])?;
            }
        }
        tx.commit()?;

        Ok(pairs.len())
    }

    /// Ids of every listing that already has an embedding.
    pub fn get_all_ids(&self) -> Result<HashSet<i64>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT listing_id FROM embeddings")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    pub fn get(&self, listing_id: i64) -> Result<Option<Vec<f32>>, StoreError> {
        let conn = self.db.connect()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM embeddings WHERE listing_id = ?1",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|bytes| decode_vector(listing_id, &bytes)).transpose()
    }

    pub fn get_all(&self) -> Result<Vec<(i64, Vec<f32>)>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt =
            conn.prepare("SELECT listing_id, embedding FROM embeddings ORDER BY listing_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            out.push((id, decode_vector(id, &bytes)?));
        }
        Ok(out)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(listing_id: i64, bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::CorruptVector {
            listing_id,
            len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_blob_is_four_bytes_per_value() {
        let bytes = encode_vector(&[1.0, -0.5, 0.25]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_vector(1, &bytes).unwrap(), vec![1.0, -0.5, 0.25]);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let result = decode_vector(9, &[0, 0, 128]);
        assert!(matches!(
            result,
            Err(StoreError::CorruptVector { listing_id: 9, len: 3 })
        ));
    }
}
