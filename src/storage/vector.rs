//! Vector helpers: sqlite-vec registration, BLOB codec and cosine scoring

use rusqlite::Connection;
use std::sync::Once;

/// Register the bundled sqlite-vec extension for every connection opened
/// afterwards in this process. Idempotent.
pub fn register_vector_extension() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point exported by
        // the statically linked sqlite-vec crate, with the signature SQLite
        // expects from an auto-extension.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec registered as auto-extension");
    });
}

/// Version string of the vector extension on this connection, if installed.
///
/// This is the capability probe: a single read-only query. Any error is
/// treated as "not installed".
pub fn vector_extension_version(conn: &Connection) -> Option<String> {
    match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
        Ok(version) if !version.is_empty() => Some(version),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Vector extension probe failed");
            None
        }
    }
}

/// Encode a vector as the little-endian f32 BLOB sqlite-vec reads
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian f32 BLOB. Returns `None` on a truncated blob.
pub fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
