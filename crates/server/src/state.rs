use anyhow::{Context, Result};
use providers::duckduckgo::DuckDuckGoClient;
use providers::router::build_vision_providers;
use providers::ProviderRouter;
use services::rooms::RoomHub;
use services::store::CourseStore;
use services::syllabus::SyllabusParser;
use services::tutor::Tutor;
use services::vision::VisionService;
use shared::settings::AppConfig;
use std::sync::Arc;
use std::time::Duration;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub router: Arc<ProviderRouter>,
    pub tutor: Arc<Tutor>,
    pub vision: Arc<VisionService>,
    pub syllabus: Arc<SyllabusParser>,
    pub search: Option<Arc<DuckDuckGoClient>>,
    pub store: CourseStore,
    pub rooms: Arc<RoomHub>,
}

impl AppState {
    /// Wire everything from configuration: providers from the model
    /// section, the database from storage.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let router = ProviderRouter::from_config(&config.model);
        match router.active_provider() {
            Some(first) => tracing::info!(
                "chat providers: {} (primary {})",
                router.provider_ids().join(", "),
                first
            ),
            None => tracing::warn!("no chat providers available, every reply will be canned"),
        }
        let vision = VisionService::new(build_vision_providers(&config.model));
        let store = CourseStore::open(&config.storage.path)
            .with_context(|| format!("opening store at {}", config.storage.path.display()))?;
        let search = if config.search.enabled {
            Some(Arc::new(DuckDuckGoClient::new(SEARCH_TIMEOUT)?))
        } else {
            None
        };
        Ok(Self::new(config, router, vision, store, search))
    }

    /// Assemble state from already-built parts.
    pub fn new(
        config: AppConfig,
        router: ProviderRouter,
        vision: VisionService,
        store: CourseStore,
        search: Option<Arc<DuckDuckGoClient>>,
    ) -> Self {
        let router = Arc::new(router);
        let mut tutor = Tutor::new(router.clone());
        if let Some(client) = &search {
            tutor = tutor.with_search(client.clone(), config.search.max_results);
        }
        Self {
            syllabus: Arc::new(SyllabusParser::new(router.clone())),
            tutor: Arc::new(tutor),
            vision: Arc::new(vision),
            config: Arc::new(config),
            router,
            search,
            store,
            rooms: Arc::new(RoomHub::new()),
        }
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.stream_timeout_secs)
    }
}
