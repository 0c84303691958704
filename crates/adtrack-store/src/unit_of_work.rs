use {
    crate::{
        error::{Result, StoreError},
        traits::{Session, Store},
    },
    std::ops::{Deref, DerefMut},
    tracing::warn,
};

/// A session scoped to one logical operation.
///
/// ```ignore
/// let mut uow = UnitOfWork::begin(store.as_ref()).await?;
/// let result = uow.put_visit(&record).await;
/// uow.finish(result).await?;
/// ```
pub struct UnitOfWork {
    store: String,
    session: Box<dyn Session>,
}

impl UnitOfWork {
    pub async fn begin(store: &dyn Store) -> Result<Self> {
        let session = store.begin().await?;
        Ok(Self {
            store: store.name().to_string(),
            session,
        })
    }

    /// Commit when `result` is `Ok`, roll back and hand the error back otherwise.
    pub async fn finish<T, E>(self, result: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        match result {
            Ok(value) => {
                self.session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.session.rollback().await {
                    warn!("Rollback on {} store failed: {}", self.store, rollback_err);
                }
                Err(err)
            }
        }
    }

    pub async fn commit(self) -> Result<()> {
        self.session.commit().await
    }
}

impl Deref for UnitOfWork {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}
