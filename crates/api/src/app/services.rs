use coalesce_core::{ConsolidatedContact, Observation};
use coalesce_infra::contact_store::{InMemoryContactStore, PostgresContactStore};
use coalesce_infra::resolver::{Resolver, ResolveError};
use sqlx::PgPool;

/// Resolution services behind the HTTP handlers.
///
/// The store backend is picked once at startup; handlers stay agnostic and
/// go through [`AppServices::resolve`].
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        resolver: Resolver<InMemoryContactStore>,
    },
    Persistent {
        resolver: Resolver<PostgresContactStore>,
    },
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        return build_persistent_services().await;
    }
    build_in_memory_services()
}

fn build_in_memory_services() -> AppServices {
    AppServices::InMemory {
        resolver: Resolver::new(InMemoryContactStore::new()),
    }
}

async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = PostgresContactStore::new(pool);
    store
        .ensure_schema()
        .await
        .expect("Failed to create contacts schema");

    AppServices::Persistent {
        resolver: Resolver::new(store),
    }
}

impl AppServices {
    pub async fn resolve(
        &self,
        observation: Observation,
    ) -> Result<Option<ConsolidatedContact>, ResolveError> {
        match self {
            AppServices::InMemory { resolver } => resolver.resolve(observation).await,
            AppServices::Persistent { resolver } => resolver.resolve(observation).await,
        }
    }
}
