use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, StoreError};
use crate::listings::Listing;

const COLUMNS: &str = "id, title, url, description, imageUrls, price, location";

/// Listing rows keyed by marketplace id. Writes are last-write-wins.
#[derive(Debug, Clone)]
pub struct ListingStore {
    db: Database,
}

/// Zero is stored as NULL together with a missing price.
///
/// A genuinely free item therefore reads back without a price.
pub fn stored_price(price: Option<f64>) -> Option<f64> {
    price.filter(|p| *p != 0.0)
}

impl ListingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or fully replace the row with `listing.id`.
    pub fn upsert(&self, listing: &Listing) -> Result<(), StoreError> {
        let conn = self.db.connect()?;
        Self::write(&conn, listing)
    }

    /// Upsert each listing in order, one autocommitted statement per row.
    ///
    /// On error, rows written before the failing one stay committed.
    pub fn upsert_many(&self, listings: &[Listing]) -> Result<usize, StoreError> {
        let conn = self.db.connect()?;

        for (idx, listing) in listings.iter().enumerate() {
            if let Err(err) = Self::write(&conn, listing) {
                log::error!(
                    "failed to write listing {} after {idx} committed: {err}",
                    listing.id
                );
                return Err(err);
            }
        }

        Ok(listings.len())
    }

    /// Every listing that has a description, ordered by id.
    pub fn query_all(&self) -> Result<Vec<Listing>, StoreError> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM listings WHERE description IS NOT NULL ORDER BY id"
        ))?;

        let rows = stmt.query_map([], RawRow::from_row)?;

        let mut listings = Vec::new();
        for row in rows {
            listings.push(row?.into_listing()?);
        }

        Ok(listings)
    }

    pub fn get(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let conn = self.db.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM listings WHERE id = ?1"),
                params![id],
                RawRow::from_row,
            )
            .optional()?;

        row.map(RawRow::into_listing).transpose()
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.db.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn write(conn: &Connection, listing: &Listing) -> Result<(), StoreError> {
        let image_urls = serde_json::to_string(&listing.image_urls)?;

        conn.execute(
            &format!("INSERT OR REPLACE INTO listings ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                listing.id,
                listing.title,
                listing.url,
                listing.description,
                image_urls,
                stored_price(listing.price),
                listing.location,
            ],
        )?;

        Ok(())
    }
}

/// Column values before `imageUrls` is decoded.
struct RawRow {
    listing: Listing,
    image_urls: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            listing: Listing {
                id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                description: row.get(3)?,
                image_urls: Vec::new(),
                price: row.get(5)?,
                location: row.get(6)?,
            },
            image_urls: row.get(4)?,
        })
    }

    fn into_listing(self) -> Result<Listing, StoreError> {
        let mut listing = self.listing;
        if let Some(raw) = self.image_urls.filter(|s| !s.is_empty()) {
            listing.image_urls = serde_json::from_str(&raw)?;
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_price_drops_zero_and_missing() {
        assert_eq!(stored_price(None), None);
        assert_eq!(stored_price(Some(0.0)), None);
        assert_eq!(stored_price(Some(-0.0)), None);
        assert_eq!(stored_price(Some(12.5)), Some(12.5));
    }
}
