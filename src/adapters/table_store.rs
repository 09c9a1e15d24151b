use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory rows persisted for one entity.
///
/// Shared by clones; a rebuild attaches fresh handles, so rows live exactly as
/// long as the registry that owns them.
#[derive(Debug, Clone, Default)]
pub struct TableHandle {
    rows: Arc<RwLock<Vec<Value>>>,
}

impl TableHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// First `count` rows, or fewer if the table is shorter.
    pub async fn take(&self, count: usize) -> Vec<Value> {
        let rows = self.rows.read().await;
        rows.iter().take(count).cloned().collect()
    }

    pub async fn first(&self) -> Option<Value> {
        self.rows.read().await.first().cloned()
    }

    pub async fn extend(&self, new_rows: Vec<Value>) {
        self.rows.write().await.extend(new_rows);
    }

    /// Grow the table to at least `target` rows.
    ///
    /// `fill` receives the number of missing rows and the index of the first
    /// one. The write lock is held across `fill`, so concurrent callers never
    /// both fill the same gap.
    pub async fn ensure<F, Fut, E>(&self, target: usize, fill: F) -> Result<(), E>
    where
        F: FnOnce(usize, usize) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Value>, E>>,
    {
        let mut rows = self.rows.write().await;
        if rows.len() >= target {
            return Ok(());
        }
        let missing = target - rows.len();
        let generated = fill(missing, rows.len()).await?;
        rows.extend(generated);
        Ok(())
    }

    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_clones_share_rows() {
        let table = TableHandle::new();
        let other = table.clone();
        table.extend(vec![json!({"a": 1})]).await;
        assert_eq!(other.len().await, 1);
        assert_eq!(other.first().await, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_ensure_only_fills_gap() {
        let table = TableHandle::new();
        table.extend(vec![json!(0), json!(1)]).await;

        table
            .ensure(4, |missing, start| async move {
                assert_eq!((missing, start), (2, 2));
                Ok::<_, ()>((start..start + missing).map(|i| json!(i)).collect())
            })
            .await
            .unwrap();
        assert_eq!(table.take(10).await, vec![json!(0), json!(1), json!(2), json!(3)]);

        table
            .ensure(3, |_, _| async { Err::<Vec<Value>, _>("should not be called") })
            .await
            .unwrap();
        assert_eq!(table.len().await, 4);
    }

    #[tokio::test]
    async fn test_clear() {
        let table = TableHandle::new();
        table.extend(vec![json!(1)]).await;
        table.clear().await;
        assert!(table.is_empty().await);
    }
}
