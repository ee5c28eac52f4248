use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use stockroom_infra::{
    DocumentService, DocumentStore, InMemoryDocumentStore, Mutation, PostgresCounterStore,
    PostgresDocumentStore, PostgresQuarantine, StockroomConfig, db,
};
use stockroom_numbering::{
    CounterStore, InMemoryCounterStore, KeyQuarantine, NumberAllocator, Reconciler,
};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

/// SSE topic carrying invalidation keys after each committed mutation.
pub const INVALIDATE_TOPIC: &str = "cache.invalidate";

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

type Counters = Arc<dyn CounterStore>;
type Documents = Arc<dyn DocumentStore>;

pub struct AppServices {
    pub documents: DocumentService<Documents>,
    pub counters: Counters,
    pub reconciler: Reconciler<Counters, Documents>,
    pub quarantine: KeyQuarantine,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    /// Tell subscribed clients which cached reads a mutation made stale.
    pub fn publish_invalidation(&self, mutation: &Mutation) {
        let keys: Vec<String> = mutation.invalidate.iter().map(ToString::to_string).collect();
        // Lossy: no subscribers is fine.
        let _ = self.realtime_tx.send(RealtimeMessage {
            topic: INVALIDATE_TOPIC.to_string(),
            payload: serde_json::json!({
                "entity": mutation.entity,
                "id": mutation.document.id,
                "keys": keys,
            }),
        });
    }
}

/// Wire stores for `config`: Postgres when `DATABASE_URL` is set, in-memory
/// otherwise.
pub async fn build_services(config: &StockroomConfig) -> Result<AppServices, sqlx::Error> {
    let (counters, documents, quarantine): (Counters, Documents, KeyQuarantine) =
        match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                db::ensure_schema(&pool).await?;
                tracing::info!("using Postgres stores");
                let quarantine = KeyQuarantine::with_store(PostgresQuarantine::new(pool.clone()));
                (
                    Arc::new(PostgresCounterStore::new(pool.clone())),
                    Arc::new(PostgresDocumentStore::new(
                        pool,
                        config.format,
                        quarantine.clone(),
                    )),
                    quarantine,
                )
            }
            None => {
                tracing::info!("DATABASE_URL not set; using in-memory stores");
                let quarantine = KeyQuarantine::new();
                let counters = InMemoryCounterStore::arc();
                let allocator = NumberAllocator::with_quarantine(
                    counters.clone(),
                    config.format,
                    quarantine.clone(),
                );
                (
                    counters,
                    Arc::new(InMemoryDocumentStore::new(allocator)),
                    quarantine,
                )
            }
        };

    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    Ok(AppServices {
        documents: DocumentService::new(
            documents.clone(),
            config.series.clone(),
            config.format,
            config.period.clone(),
        ),
        reconciler: Reconciler::new(counters.clone(), documents, config.format, quarantine.clone()),
        counters,
        quarantine,
        realtime_tx,
    })
}

pub fn invalidation_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        Err(lagged) => {
            tracing::warn!(error = %lagged, "invalidation subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
