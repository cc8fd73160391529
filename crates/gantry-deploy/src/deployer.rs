//! The reconciliation engine.
//!
//! `deploy` is a pure-in, pure-out transition: it takes the current
//! [`DeploymentState`] and a [`DeploymentRequest`], drives the
//! [`DeployCallback`] through the computed plan, and returns the new state.
//! The deployer holds no mutable state of its own; callers serialize
//! `deploy` calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use gantry_core::{RangePolicy, RegionId, Version, VersionRange};
use gantry_model::Module;
use gantry_policy::{Blacklist, Overrides};
use gantry_resolve::{GraphBuilder, GreedyResolver, Resolver, Wiring};

use crate::callback::{DeployCallback, ModuleHandle};
use crate::catalog::Catalog;
use crate::error::{CallbackError, DeployError, DeployResult};
use crate::event::{DeployEvent, EventBus, EventMetadata, FeatureEvent, FeatureEventKind};
use crate::plan::{self, DeploymentPlan};
use crate::request::{DeployOption, DeploymentRequest};
use crate::state::DeploymentState;

/// How long a module gets to wind down before a stop is considered failed.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

macro_rules! step {
    ($self:ident, $next:ident, $name:literal, $call:expr) => {
        if let Err(err) = $call {
            return Err($self.abort(&mut $next, $name, err).await);
        }
    };
}

/// Drives reconciliation: resolve, diff, apply, commit.
pub struct Deployer {
    catalog: Catalog,
    resolver: Box<dyn Resolver + Send + Sync>,
    callback: Arc<dyn DeployCallback>,
    bus: EventBus,
}

impl Deployer {
    /// A deployer over the given catalog and runtime callback, using the
    /// built-in greedy resolver.
    #[must_use]
    pub fn new(catalog: Catalog, callback: Arc<dyn DeployCallback>) -> Self {
        Self {
            catalog,
            resolver: Box::new(GreedyResolver::new()),
            callback,
            bus: EventBus::new(),
        }
    }

    /// Swap in a different resolver implementation.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn Resolver + Send + Sync>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The bus deployment events are published on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Reconcile the runtime with the request.
    ///
    /// On success the returned state reflects the fully applied plan. When
    /// prerequisites or artifacts are missing nothing is mutated; when a
    /// callback step fails mid-plan, applied steps stay applied and the
    /// persisted state records exactly that prefix.
    ///
    /// # Errors
    ///
    /// [`DeployError::Resolution`] when no consistent wiring exists,
    /// [`DeployError::PartialDeployment`] when prerequisite features or
    /// module artifacts are missing, and [`DeployError::Callback`] when the
    /// runtime rejects a plan step.
    pub async fn deploy(
        &self,
        state: &DeploymentState,
        request: &DeploymentRequest,
    ) -> DeployResult<DeploymentState> {
        self.bus.publish(DeployEvent::DeploymentStarted {
            metadata: EventMetadata::new("deployer"),
        });

        // Policy filtering works on a per-run copy of the module graph.
        let mut modules = self.catalog.modules().clone();
        let blacklist = Blacklist::new(&request.blacklist);
        let flags = blacklist.apply(
            self.catalog.features(),
            modules.keys().map(String::as_str),
        );
        let candidates: Vec<Module> = self.catalog.modules().values().cloned().collect();
        Overrides::new(&request.overrides).apply(&mut modules, &candidates);

        let graph = GraphBuilder::new(self.catalog.features(), &modules, &state.filters)
            .with_flags(&flags)
            .with_resolution_range(request.feature_resolution_range)
            .build(&request.requirements, &state.managed_modules)?;

        // Prerequisites and missing artifacts abort before any mutation.
        let mut missing: BTreeMap<RegionId, BTreeSet<String>> = BTreeMap::new();
        for (region, exprs) in graph.prerequisites(self.catalog.features()) {
            for expr in exprs {
                if !prerequisite_satisfied(state, &region, &expr, request.feature_resolution_range)
                {
                    missing.entry(region.clone()).or_default().insert(expr);
                }
            }
        }
        for (region, node) in &graph.regions {
            if !node.missing_artifacts.is_empty() {
                missing
                    .entry(region.clone())
                    .or_default()
                    .extend(node.missing_artifacts.iter().cloned());
            }
        }
        if !missing.is_empty() {
            return Err(DeployError::PartialDeployment { missing });
        }

        let wiring = self.resolver.resolve(&graph)?;
        let plan = plan::compute(state, &wiring, &modules, request);

        if request.has_option(DeployOption::Verbose) {
            self.callback.print(&plan.render(), false).await;
        }
        if request.has_option(DeployOption::Simulate) {
            info!("Simulation only:\n{}", plan.render());
            return Ok(state.clone());
        }
        if plan.is_empty() && state.requirements == request.requirements {
            debug!("Nothing to do");
            self.bus.publish(DeployEvent::DeploymentFinished {
                metadata: EventMetadata::new("deployer"),
                changed: false,
            });
            return Ok(state.clone());
        }

        self.apply(state, request, &plan, &wiring, &modules).await
    }

    /// Deploy, installing missing prerequisite features in earlier cycles
    /// until the request succeeds or the missing set stops shrinking.
    ///
    /// # Errors
    ///
    /// [`DeployError::PrerequisiteLoop`] when repeated prerequisite cycles
    /// never converge; otherwise whatever the final [`Deployer::deploy`]
    /// returns.
    pub async fn deploy_fully(
        &self,
        state: DeploymentState,
        request: &DeploymentRequest,
    ) -> DeployResult<DeploymentState> {
        let mut attempted = BTreeSet::new();
        self.deploy_with_prerequisites(state, request, &mut attempted)
            .await
    }

    async fn deploy_with_prerequisites(
        &self,
        mut state: DeploymentState,
        request: &DeploymentRequest,
        attempted: &mut BTreeSet<String>,
    ) -> DeployResult<DeploymentState> {
        // Requirements added by prerequisite cycles below this level must
        // stay requested on the retry, or the retry would tear the
        // prerequisites right back down.
        let baseline = state.requirements.clone();
        loop {
            let mut full = request.clone();
            for (region, exprs) in &state.requirements {
                let before = baseline.get(region);
                for expr in exprs {
                    if !before.is_some_and(|set| set.contains(expr)) {
                        full.requirements
                            .entry(region.clone())
                            .or_default()
                            .insert(expr.clone());
                    }
                }
            }

            match self.deploy(&state, &full).await {
                Ok(next) => return Ok(next),
                Err(DeployError::PartialDeployment { missing }) => {
                    let flat: BTreeSet<String> =
                        missing.values().flatten().cloned().collect();
                    if flat.iter().all(|entry| attempted.contains(entry)) {
                        return Err(DeployError::PrerequisiteLoop { missing });
                    }
                    attempted.extend(flat);
                    info!(
                        count = missing.values().map(BTreeSet::len).sum::<usize>(),
                        "Deploying prerequisites first"
                    );

                    let mut prerequisite_request = request.clone();
                    prerequisite_request.requirements = state.requirements.clone();
                    for (region, exprs) in &missing {
                        prerequisite_request
                            .requirements
                            .entry(region.clone())
                            .or_default()
                            .extend(exprs.iter().cloned());
                    }
                    state = Box::pin(self.deploy_with_prerequisites(
                        state,
                        &prerequisite_request,
                        attempted,
                    ))
                    .await?;
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Re-announce installed features to a freshly attached listener.
    pub async fn replay_events(&self, state: &DeploymentState) {
        for (region, features) in &state.installed_features {
            for feature in features {
                let event = FeatureEvent {
                    metadata: EventMetadata::new("deployer"),
                    feature: feature.clone(),
                    region: region.clone(),
                    kind: FeatureEventKind::Installed,
                    replay: true,
                };
                if let Err(err) = self.callback.emit_feature_event(&event).await {
                    warn!(feature = %event.feature, error = %err, "Feature event listener failed");
                }
                self.bus.publish(DeployEvent::Feature(event));
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn apply(
        &self,
        state: &DeploymentState,
        request: &DeploymentRequest,
        plan: &DeploymentPlan,
        wiring: &Wiring,
        modules: &BTreeMap<String, Module>,
    ) -> DeployResult<DeploymentState> {
        let mut next = state.clone();
        next.requirements = request.requirements.clone();

        let mut touched: Vec<ModuleHandle> = Vec::new();
        let mut refresh_needed = false;

        for (region, region_plan) in &plan.regions {
            for id in &region_plan.to_uninstall {
                let handle = ModuleHandle::new(region.clone(), id.clone());
                step!(
                    self,
                    next,
                    "stop-module",
                    self.callback.stop_module(&handle, STOP_TIMEOUT).await
                );
                step!(
                    self,
                    next,
                    "uninstall-module",
                    self.callback.uninstall_module(&handle).await
                );
                if let Some(set) = next.managed_modules.get_mut(region) {
                    set.remove(id);
                }
                next.module_checksums.remove(id);
                refresh_needed = true;
            }

            for update in &region_plan.to_update {
                let Some(module) = modules.get(&update.location) else {
                    continue;
                };
                let handle = ModuleHandle::new(region.clone(), update.from.clone());
                step!(
                    self,
                    next,
                    "stop-module",
                    self.callback.stop_module(&handle, STOP_TIMEOUT).await
                );
                step!(
                    self,
                    next,
                    "update-module",
                    self.callback.update_module(&handle, module).await
                );
                let managed = next.managed_modules.entry(region.clone()).or_default();
                managed.remove(&update.from);
                managed.insert(update.to.clone());
                next.module_checksums.remove(&update.from);
                match module.checksum {
                    Some(checksum) => {
                        next.module_checksums.insert(update.to.clone(), checksum);
                    },
                    None => {
                        next.module_checksums.remove(&update.to);
                    },
                }
                touched.push(ModuleHandle::new(region.clone(), update.to.clone()));
                refresh_needed = true;
            }

            let mut installed_here = Vec::new();
            for install in &region_plan.to_install {
                let Some(module) = modules.get(&install.location) else {
                    continue;
                };
                let handle = match self.callback.install_module(region, module).await {
                    Ok(handle) => handle,
                    Err(err) => {
                        return Err(self.abort(&mut next, "install-module", err).await);
                    },
                };
                next.managed_modules
                    .entry(region.clone())
                    .or_default()
                    .insert(install.id.clone());
                if let Some(checksum) = module.checksum {
                    next.module_checksums.insert(install.id.clone(), checksum);
                }
                touched.push(handle);
                installed_here.push(install.id.clone());
            }
            if !installed_here.is_empty() {
                self.bus.publish(DeployEvent::ModulesInstalled {
                    metadata: EventMetadata::new("deployer"),
                    region: region.clone(),
                    modules: installed_here,
                });
            }
        }

        if refresh_needed && !request.has_option(DeployOption::NoAutoRefresh) {
            step!(
                self,
                next,
                "refresh-modules",
                self.callback.refresh_modules(&touched).await
            );
        }
        step!(
            self,
            next,
            "resolve-modules",
            self.callback.resolve_modules(&touched, wiring).await
        );
        step!(
            self,
            next,
            "replace-visibility-graph",
            self.callback
                .replace_visibility_graph(&next.filters, &next)
                .await
        );
        self.bus.publish(DeployEvent::ModulesResolved {
            metadata: EventMetadata::new("deployer"),
        });

        if !request.has_option(DeployOption::NoAutoStart) {
            for handle in &touched {
                let keep_stopped = request
                    .leave_stopped
                    .get(&handle.region)
                    .is_some_and(|set| set.contains(&handle.id));
                if keep_stopped {
                    debug!(module = %handle, "Leaving module stopped on request");
                    continue;
                }
                step!(
                    self,
                    next,
                    "start-module",
                    self.callback.start_module(handle).await
                );
            }
        }

        next.installed_features = wiring.features_per_region.clone();
        next.prune_empty();
        step!(
            self,
            next,
            "persist-state",
            self.callback.persist_state(&next).await
        );

        self.emit_feature_transitions(plan).await;
        self.bus.publish(DeployEvent::DeploymentFinished {
            metadata: EventMetadata::new("deployer"),
            changed: true,
        });
        info!(
            regions = plan.regions.len(),
            "Deployment committed"
        );
        Ok(next)
    }

    /// Abort a half-applied plan: persist the committed prefix and wrap the
    /// failure. Applied steps are deliberately not rolled back.
    async fn abort(
        &self,
        partial: &mut DeploymentState,
        step: &str,
        source: CallbackError,
    ) -> DeployError {
        warn!(step, error = %source, "Deployment aborted, keeping applied steps");
        partial.prune_empty();
        if let Err(err) = self.callback.persist_state(partial).await {
            warn!(error = %err, "Failed to persist partial state after abort");
        }
        self.bus.publish(DeployEvent::DeploymentFinished {
            metadata: EventMetadata::new("deployer"),
            changed: true,
        });
        DeployError::Callback {
            step: step.to_string(),
            source,
        }
    }

    /// Announce feature transitions after the new state is committed.
    /// Listener failures are logged, never propagated.
    async fn emit_feature_transitions(&self, plan: &DeploymentPlan) {
        for (region, features) in &plan.features_removed {
            for feature in features {
                self.emit_feature(region, feature.clone(), FeatureEventKind::Uninstalled)
                    .await;
            }
        }
        for (region, features) in &plan.features_added {
            for feature in features {
                self.emit_feature(region, feature.clone(), FeatureEventKind::Installed)
                    .await;
            }
        }
    }

    async fn emit_feature(
        &self,
        region: &RegionId,
        feature: gantry_core::FeatureId,
        kind: FeatureEventKind,
    ) {
        let event = FeatureEvent {
            metadata: EventMetadata::new("deployer"),
            feature,
            region: region.clone(),
            kind,
            replay: false,
        };
        if let Err(err) = self.callback.emit_feature_event(&event).await {
            warn!(feature = %event.feature, error = %err, "Feature event listener failed");
        }
        self.bus.publish(DeployEvent::Feature(event));
    }
}

/// Whether an installed feature satisfies a prerequisite expression
/// (`name`, `name/version`, or `name/[range)`).
fn prerequisite_satisfied(
    state: &DeploymentState,
    region: &RegionId,
    expr: &str,
    policy: RangePolicy,
) -> bool {
    let (name, range) = match expr.split_once('/') {
        None => (expr, VersionRange::any()),
        Some((name, version)) => {
            let range = if version.starts_with('[') || version.starts_with('(') {
                VersionRange::parse(version).unwrap_or_else(|_| VersionRange::any())
            } else {
                match Version::parse(version) {
                    Ok(v) if v == Version::zero() => VersionRange::any(),
                    Ok(v) => policy.range_for(&v),
                    Err(_) => VersionRange::any(),
                }
            };
            (name, range)
        },
    };
    state
        .installed_features
        .get(region)
        .is_some_and(|features| {
            features
                .iter()
                .any(|f| f.name == name && range.contains(&f.version))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gantry_core::{FeatureId, ModuleId};
    use gantry_model::Feature;

    use crate::error::CallbackResult;
    use crate::request::SnapshotPolicy;

    use super::*;

    /// Records every lifecycle call and can be told to fail on one of them.
    #[derive(Default)]
    struct RecordingCallback {
        ops: Mutex<Vec<String>>,
        fail_on: Mutex<Option<String>>,
        persisted: Mutex<Vec<DeploymentState>>,
    }

    impl RecordingCallback {
        fn record(&self, op: String) -> CallbackResult<()> {
            let fail = self
                .fail_on
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|pattern| op.starts_with(pattern.as_str()));
            self.ops.lock().unwrap().push(op.clone());
            if fail {
                return Err(format!("injected failure at {op}").into());
            }
            Ok(())
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.ops.lock().unwrap().clear();
        }

        fn fail_on(&self, pattern: &str) {
            *self.fail_on.lock().unwrap() = Some(pattern.to_string());
        }

        fn last_persisted(&self) -> Option<DeploymentState> {
            self.persisted.lock().unwrap().last().cloned()
        }
    }

    #[async_trait::async_trait]
    impl DeployCallback for RecordingCallback {
        async fn install_module(
            &self,
            region: &RegionId,
            module: &Module,
        ) -> CallbackResult<ModuleHandle> {
            self.record(format!("install {}", module.id))?;
            Ok(ModuleHandle::new(region.clone(), module.id.clone()))
        }

        async fn update_module(
            &self,
            handle: &ModuleHandle,
            module: &Module,
        ) -> CallbackResult<()> {
            self.record(format!("update {} -> {}", handle.id, module.id))
        }

        async fn uninstall_module(&self, handle: &ModuleHandle) -> CallbackResult<()> {
            self.record(format!("uninstall {}", handle.id))
        }

        async fn start_module(&self, handle: &ModuleHandle) -> CallbackResult<()> {
            self.record(format!("start {}", handle.id))
        }

        async fn stop_module(
            &self,
            handle: &ModuleHandle,
            _timeout: Duration,
        ) -> CallbackResult<()> {
            self.record(format!("stop {}", handle.id))
        }

        async fn refresh_modules(&self, handles: &[ModuleHandle]) -> CallbackResult<()> {
            self.record(format!("refresh {}", handles.len()))
        }

        async fn resolve_modules(
            &self,
            _handles: &[ModuleHandle],
            _wiring: &Wiring,
        ) -> CallbackResult<()> {
            Ok(())
        }

        async fn replace_visibility_graph(
            &self,
            _filters: &gantry_model::RegionFilters,
            _state: &DeploymentState,
        ) -> CallbackResult<()> {
            Ok(())
        }

        async fn persist_state(&self, state: &DeploymentState) -> CallbackResult<()> {
            self.persisted.lock().unwrap().push(state.clone());
            Ok(())
        }

        async fn emit_feature_event(&self, event: &FeatureEvent) -> CallbackResult<()> {
            let kind = match event.kind {
                FeatureEventKind::Installed => "installed",
                FeatureEventKind::Uninstalled => "uninstalled",
            };
            self.ops.lock().unwrap().push(format!(
                "event {kind} {} replay={}",
                event.feature, event.replay
            ));
            Ok(())
        }

        async fn print(&self, _message: &str, _is_error: bool) {}
    }

    fn module(name: &str, version: &str) -> Module {
        Module::new(
            ModuleId::new(name, Version::parse(version).unwrap()),
            format!("mvn:example/{name}/{version}"),
        )
    }

    fn feature(name: &str, version: &str, modules: &[&str]) -> Feature {
        let mut f = Feature::new(FeatureId::new(name, Version::parse(version).unwrap()));
        f.modules = modules.iter().map(ToString::to_string).collect();
        f
    }

    fn web_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_module(module("http", "1.0.0"));
        catalog.add_feature(feature("web", "1.0.0", &["mvn:example/http/1.0.0"]));
        catalog
    }

    fn request_for(expr: &str) -> DeploymentRequest {
        let mut request = DeploymentRequest::new();
        request.require(&RegionId::root(), expr);
        request
    }

    #[tokio::test]
    async fn fresh_deploy_installs_and_starts() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);
        let mut events = deployer.bus().subscribe();

        let next = deployer
            .deploy(&DeploymentState::new(), &request_for("web/1.0.0"))
            .await
            .unwrap();

        assert!(next.is_managed(&RegionId::root(), &ModuleId::new("http", Version::new(1, 0, 0))));
        assert!(next
            .is_feature_installed(&RegionId::root(), &FeatureId::new("web", Version::new(1, 0, 0))));
        assert_eq!(
            callback.ops(),
            vec![
                "install http/1.0.0".to_string(),
                "start http/1.0.0".to_string(),
                "event installed web/1.0.0 replay=false".to_string(),
            ]
        );

        let mut seen = Vec::new();
        while let Some(event) = events.try_recv() {
            seen.push(event.event_type());
        }
        assert_eq!(
            seen,
            vec![
                "deployment_started",
                "modules_installed",
                "modules_resolved",
                "feature_installed",
                "deployment_finished",
            ]
        );
    }

    #[tokio::test]
    async fn redeploy_is_idempotent() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);
        let request = request_for("web/1.0.0");

        let state = deployer
            .deploy(&DeploymentState::new(), &request)
            .await
            .unwrap();
        callback.clear();

        let again = deployer.deploy(&state, &request).await.unwrap();
        assert_eq!(again, state);
        assert!(callback.ops().is_empty());
    }

    #[tokio::test]
    async fn simulate_touches_nothing() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);

        let mut request = request_for("web/1.0.0");
        request.options.insert(DeployOption::Simulate);

        let state = DeploymentState::new();
        let next = deployer.deploy(&state, &request).await.unwrap();
        assert_eq!(next, state);
        assert!(callback.ops().is_empty());
        assert!(callback.last_persisted().is_none());
    }

    #[tokio::test]
    async fn removing_requirement_uninstalls() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);

        let state = deployer
            .deploy(&DeploymentState::new(), &request_for("web/1.0.0"))
            .await
            .unwrap();
        callback.clear();

        let next = deployer
            .deploy(&state, &DeploymentRequest::new())
            .await
            .unwrap();
        assert!(next.managed_modules.is_empty());
        assert!(next.installed_features.is_empty());
        let ops = callback.ops();
        assert_eq!(
            ops,
            vec![
                "stop http/1.0.0".to_string(),
                "uninstall http/1.0.0".to_string(),
                "refresh 0".to_string(),
                "event uninstalled web/1.0.0 replay=false".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_prerequisite_is_partial_with_no_mutation() {
        let mut catalog = web_catalog();
        catalog.add_module(module("app-core", "1.0.0"));
        let mut app = feature("app", "1.0.0", &["mvn:example/app-core/1.0.0"]);
        app.prerequisites.push("web/1.0.0".to_string());
        catalog.add_feature(app);

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let err = deployer
            .deploy(&DeploymentState::new(), &request_for("app/1.0.0"))
            .await
            .unwrap_err();
        match err {
            DeployError::PartialDeployment { missing } => {
                assert!(missing[&RegionId::root()].contains("web/1.0.0"));
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(callback.ops().is_empty());
        assert!(callback.last_persisted().is_none());
    }

    #[tokio::test]
    async fn deploy_fully_installs_prerequisites_first() {
        let mut catalog = web_catalog();
        catalog.add_module(module("app-core", "1.0.0"));
        let mut app = feature("app", "1.0.0", &["mvn:example/app-core/1.0.0"]);
        app.prerequisites.push("web/1.0.0".to_string());
        catalog.add_feature(app);

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let next = deployer
            .deploy_fully(DeploymentState::new(), &request_for("app/1.0.0"))
            .await
            .unwrap();

        let root = RegionId::root();
        assert!(next.is_feature_installed(&root, &FeatureId::new("web", Version::new(1, 0, 0))));
        assert!(next.is_feature_installed(&root, &FeatureId::new("app", Version::new(1, 0, 0))));

        let ops = callback.ops();
        let http_install = ops.iter().position(|op| op == "install http/1.0.0").unwrap();
        let app_install = ops
            .iter()
            .position(|op| op == "install app-core/1.0.0")
            .unwrap();
        assert!(http_install < app_install);
    }

    #[tokio::test]
    async fn prerequisite_cycle_is_detected() {
        let mut catalog = Catalog::new();
        let mut a = feature("a", "1.0.0", &[]);
        a.prerequisites.push("b/1.0.0".to_string());
        let mut b = feature("b", "1.0.0", &[]);
        b.prerequisites.push("a/1.0.0".to_string());
        catalog.add_feature(a);
        catalog.add_feature(b);

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let err = deployer
            .deploy_fully(DeploymentState::new(), &request_for("a/1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::PrerequisiteLoop { .. }));
    }

    #[tokio::test]
    async fn missing_artifact_is_partial() {
        let mut catalog = Catalog::new();
        catalog.add_feature(feature("ghost", "1.0.0", &["mvn:example/ghost/1.0.0"]));

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let err = deployer
            .deploy(&DeploymentState::new(), &request_for("ghost/1.0.0"))
            .await
            .unwrap_err();
        match err {
            DeployError::PartialDeployment { missing } => {
                assert!(missing[&RegionId::root()].contains("mvn:example/ghost/1.0.0"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn callback_failure_keeps_applied_prefix() {
        let mut catalog = Catalog::new();
        catalog.add_module(module("alpha", "1.0.0"));
        catalog.add_module(module("beta", "1.0.0"));
        catalog.add_feature(feature(
            "pair",
            "1.0.0",
            &["mvn:example/alpha/1.0.0", "mvn:example/beta/1.0.0"],
        ));

        let callback = Arc::new(RecordingCallback::default());
        callback.fail_on("install beta");
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let err = deployer
            .deploy(&DeploymentState::new(), &request_for("pair/1.0.0"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, DeployError::Callback { ref step, .. } if step.as_str() == "install-module")
        );

        // Alpha stays installed; the persisted state records exactly that.
        let persisted = callback.last_persisted().unwrap();
        let root = RegionId::root();
        assert!(persisted.is_managed(&root, &ModuleId::new("alpha", Version::new(1, 0, 0))));
        assert!(!persisted.is_managed(&root, &ModuleId::new("beta", Version::new(1, 0, 0))));
        // Feature transitions never committed.
        assert!(persisted.installed_features.is_empty());
    }

    #[tokio::test]
    async fn patch_update_happens_in_place() {
        let mut catalog = Catalog::new();
        catalog.add_module(module("http", "1.0.1"));
        catalog.add_feature(feature("web", "1.0.1", &["mvn:example/http/1.0.1"]));

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        // State as if web/1.0.0 with http/1.0.0 had been deployed before.
        let mut state = DeploymentState::new();
        let root = RegionId::root();
        state
            .managed_modules
            .entry(root.clone())
            .or_default()
            .insert(ModuleId::new("http", Version::new(1, 0, 0)));
        state
            .installed_features
            .entry(root.clone())
            .or_default()
            .insert(FeatureId::new("web", Version::new(1, 0, 0)));

        let next = deployer
            .deploy(&state, &request_for("web/1.0.1"))
            .await
            .unwrap();

        assert!(next.is_managed(&root, &ModuleId::new("http", Version::new(1, 0, 1))));
        assert!(!next.is_managed(&root, &ModuleId::new("http", Version::new(1, 0, 0))));
        let ops = callback.ops();
        assert!(ops.contains(&"update http/1.0.0 -> http/1.0.1".to_string()));
        assert!(!ops.iter().any(|op| op.starts_with("uninstall")));
    }

    #[tokio::test]
    async fn snapshot_redeploy_respects_policy() {
        let mut catalog = Catalog::new();
        let mut dev = module("dev", "1.0.0");
        dev.snapshot = true;
        dev.checksum = Some(2);
        catalog.add_module(dev);
        catalog.add_feature(feature("devstack", "1.0.0", &["mvn:example/dev/1.0.0"]));

        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(catalog, Arc::clone(&callback) as _);

        let mut state = DeploymentState::new();
        let root = RegionId::root();
        let id = ModuleId::new("dev", Version::new(1, 0, 0));
        state
            .managed_modules
            .entry(root.clone())
            .or_default()
            .insert(id.clone());
        state
            .installed_features
            .entry(root.clone())
            .or_default()
            .insert(FeatureId::new("devstack", Version::new(1, 0, 0)));
        state.module_checksums.insert(id.clone(), 1);
        state
            .requirements
            .entry(root.clone())
            .or_default()
            .insert("devstack/1.0.0".to_string());

        let request = request_for("devstack/1.0.0");
        let next = deployer.deploy(&state, &request).await.unwrap();
        assert_eq!(next.module_checksums[&id], 2);
        assert!(callback
            .ops()
            .contains(&"update dev/1.0.0 -> dev/1.0.0".to_string()));

        // With the policy off, the changed checksum is ignored.
        callback.clear();
        let mut frozen = request.clone();
        frozen.update_snapshots = SnapshotPolicy::None;
        let unchanged = deployer.deploy(&state, &frozen).await.unwrap();
        assert_eq!(unchanged.module_checksums[&id], 1);
        assert!(callback.ops().is_empty());
    }

    #[tokio::test]
    async fn leave_stopped_skips_start() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);

        let mut request = request_for("web/1.0.0");
        request
            .leave_stopped
            .entry(RegionId::root())
            .or_default()
            .insert(ModuleId::new("http", Version::new(1, 0, 0)));

        deployer
            .deploy(&DeploymentState::new(), &request)
            .await
            .unwrap();
        assert!(!callback.ops().iter().any(|op| op.starts_with("start")));
    }

    #[tokio::test]
    async fn replay_announces_installed_features() {
        let callback = Arc::new(RecordingCallback::default());
        let deployer = Deployer::new(web_catalog(), Arc::clone(&callback) as _);

        let state = deployer
            .deploy(&DeploymentState::new(), &request_for("web/1.0.0"))
            .await
            .unwrap();
        callback.clear();

        deployer.replay_events(&state).await;
        assert_eq!(
            callback.ops(),
            vec!["event installed web/1.0.0 replay=true".to_string()]
        );
    }
}
