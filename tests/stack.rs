//! End-to-end tests for the parameterized EKS stack.
//!
//! These tests tell the story of one full deployment: parameters come
//! out of a configuration store, [`build_stack`] turns them into a
//! validated plan, the plan orders infrastructure ahead of workloads,
//! and the serialized declarative form round-trips without losing or
//! expanding secret tokens.

use std::fs;

use trellis::config::MemoryConfig;
use trellis::secret::SecretValue;
use trellis::stack::{
    build_stack, AppSecrets, BootstrapParams, StackParams, APP_SECRETS_NAME,
    BOOTSTRAP_CONFIG_NAME, BOOTSTRAP_PROPERTIES_FILE,
};
use trellis::{DeploymentPlan, ResourceId, ResourceKind, ResourceNode, ResourceSpec};

// =============================================================================
// Fixtures
// =============================================================================

/// Configuration store shaped like a production deployment: required
/// keys, credential tokens, and the workload-secrets toggle on.
fn prod_store() -> MemoryConfig {
    MemoryConfig::new()
        .with_value("stack_name", "streams-prod")
        .with_value("admin_account_arn", "arn:aws:iam::111122223333:root")
        .with_value("app_image", "public.ecr.aws/demo/streams-app:latest")
        .with_value("app_namespace", "streams")
        .with_value("workload_secrets", "true")
        .with_value("mongo_endpoint", "mongodb.internal:27017")
        .with_secret("mongo_username")
        .with_secret("mongo_password")
        .with_secret("platform_api_key")
        .with_secret("platform_secret")
        .with_secret("kafka_api_key")
        .with_secret("kafka_api_secret")
}

fn prod_params() -> StackParams {
    let mut params = StackParams::from_config(&prod_store()).unwrap();
    params.bootstrap = Some(BootstrapParams {
        image: "public.ecr.aws/demo/bootstrap:0.18.0".to_string(),
        properties: "bootstrap.servers=broker:9092\n".to_string(),
        arguments: Some(
            "-propertiesFile /etc/config/bootstrap.properties -name COUNT".to_string(),
        ),
    });
    params
}

fn position(order: &[&ResourceNode], kind: ResourceKind, name: &str) -> usize {
    let id = ResourceId::new(kind, name);
    order
        .iter()
        .position(|n| n.id() == id)
        .unwrap_or_else(|| panic!("{} not in apply order", id))
}

// =============================================================================
// Ordering
// =============================================================================

/// Story: the plan applies in provisioning order. The network and both
/// IAM roles exist before the cluster, the cluster before its provider
/// context, the provider context before every Kubernetes object, and
/// each workload after the secret it reads and the config map it
/// mounts.
#[test]
fn story_prod_plan_applies_in_provisioning_order() {
    let plan = build_stack(&prod_params()).unwrap();
    let order = plan.apply_order().unwrap();

    let network = position(&order, ResourceKind::Network, "streams-prod-vpc");
    let admin = position(&order, ResourceKind::IamRole, "streams-prod-cluster-admin");
    let nodes = position(&order, ResourceKind::IamRole, "streams-prod-node-role");
    let cluster = position(&order, ResourceKind::Cluster, "streams-prod-cluster");
    let provider = position(&order, ResourceKind::ProviderContext, "streams-prod-provider");
    let role = position(&order, ResourceKind::ClusterRole, "cluster-admin-role");
    let binding = position(
        &order,
        ResourceKind::ClusterRoleBinding,
        "cluster-admin-role-binding",
    );
    let namespace = position(&order, ResourceKind::Namespace, "streams");
    let secret = position(&order, ResourceKind::Secret, APP_SECRETS_NAME);
    let config_map = position(&order, ResourceKind::ConfigMap, BOOTSTRAP_CONFIG_NAME);
    let app = position(&order, ResourceKind::Workload, "app");
    let generator = position(&order, ResourceKind::Workload, "generator");
    let bootstrap = position(&order, ResourceKind::Workload, "bootstrap");

    assert!(network < cluster);
    assert!(admin < cluster);
    assert!(nodes < cluster);
    assert!(cluster < provider);
    assert!(provider < role);
    assert!(role < binding);
    assert!(provider < namespace);
    assert!(namespace < secret);
    assert!(secret < app);
    assert!(secret < generator);
    assert!(namespace < config_map);
    assert!(config_map < bootstrap);
}

#[test]
fn test_apply_order_is_idempotent() {
    let plan = build_stack(&prod_params()).unwrap();
    let first: Vec<String> = plan
        .apply_order()
        .unwrap()
        .iter()
        .map(|n| n.id().to_string())
        .collect();
    let second: Vec<String> = plan
        .apply_order()
        .unwrap()
        .iter()
        .map(|n| n.id().to_string())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_identical_parameters_build_identical_plans() {
    let params = prod_params();
    let first = build_stack(&params).unwrap();
    let second = build_stack(&params).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
}

// =============================================================================
// Round trips
// =============================================================================

/// Story: an operator reviews the plan as YAML, checks it in, and the
/// engine parses it back. The parsed plan equals the built one, secret
/// entries are still opaque store tokens, and the kubeconfig export is
/// still marked secret.
#[test]
fn story_plan_round_trips_preserving_secret_tokens() {
    let plan = build_stack(&prod_params()).unwrap();
    let yaml = plan.to_yaml().unwrap();
    assert!(yaml.contains("kafka_api_secret"));

    let back = DeploymentPlan::from_yaml(&yaml).unwrap();
    assert_eq!(back, plan);
    assert!(back.export("kubeconfig").unwrap().secret);

    let secret_id = ResourceId::new(ResourceKind::Secret, APP_SECRETS_NAME);
    let node = back.graph().get(&secret_id).unwrap();
    match &node.spec {
        ResourceSpec::Secret(s) => {
            assert!(s.data["KAFKA_API_SECRET"].is_reference());
            assert!(s.data["MONGO_PASSWORD"].is_reference());
            match &s.data["MONGO_ENDPOINT"] {
                SecretValue::Literal(host) => assert_eq!(host, "mongodb.internal:27017"),
                other => panic!("expected inline endpoint, got {:?}", other),
            }
        }
        other => panic!("expected secret spec, got {:?}", other),
    }
}

#[test]
fn test_plan_round_trips_through_json() {
    let plan = build_stack(&prod_params()).unwrap();
    let back = DeploymentPlan::from_json(&plan.to_json().unwrap()).unwrap();
    assert_eq!(back, plan);
}

// =============================================================================
// Environment toggles
// =============================================================================

/// Story: the same stack, deployed without credentials or a bootstrap
/// job, declares neither the Secret nor the ConfigMap nor the bootstrap
/// workload, and the app runs without injected environment.
#[test]
fn story_minimal_environment_plan() {
    let mut params = prod_params();
    params.app_secrets = None;
    params.bootstrap = None;
    let plan = build_stack(&params).unwrap();

    let kinds: Vec<ResourceKind> = plan.graph().nodes().iter().map(|n| n.id().kind).collect();
    assert!(!kinds.contains(&ResourceKind::Secret));
    assert!(!kinds.contains(&ResourceKind::ConfigMap));
    assert_eq!(
        kinds.iter().filter(|k| **k == ResourceKind::Workload).count(),
        2
    );

    let app = plan
        .graph()
        .get(&ResourceId::new(ResourceKind::Workload, "app"))
        .unwrap();
    match &app.spec {
        ResourceSpec::Workload(w) => {
            assert!(w.env_from_secrets.is_empty());
            assert!(w.config_mounts.is_empty());
        }
        other => panic!("expected workload spec, got {:?}", other),
    }

    // Exports do not depend on the optional objects.
    assert_eq!(plan.exports().len(), 6);
}

#[test]
fn test_bootstrap_properties_load_from_file() {
    let path = std::env::temp_dir().join("trellis-it-bootstrap.properties");
    fs::write(&path, "bootstrap.servers=broker:9092\nacks=all\n").unwrap();

    let store = prod_store()
        .with_value("bootstrap_properties_path", path.display().to_string())
        .with_value("bootstrap_image", "public.ecr.aws/demo/bootstrap:0.18.0");
    let params = StackParams::from_config(&store).unwrap();
    fs::remove_file(&path).unwrap();

    let plan = build_stack(&params).unwrap();
    let config_map = plan
        .graph()
        .get(&ResourceId::new(ResourceKind::ConfigMap, BOOTSTRAP_CONFIG_NAME))
        .unwrap();
    match &config_map.spec {
        ResourceSpec::ConfigMap(cm) => {
            assert!(cm.data[BOOTSTRAP_PROPERTIES_FILE].contains("acks=all"));
        }
        other => panic!("expected config map spec, got {:?}", other),
    }
}

// =============================================================================
// Exports
// =============================================================================

#[test]
fn test_exports_cover_the_operator_handoff() {
    let plan = build_stack(&prod_params()).unwrap();
    let names: Vec<&str> = plan.exports().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "kubeconfig",
            "vpcId",
            "natPublicIps",
            "clusterName",
            "clusterAdminRoleArn",
            "updateKubeCmd"
        ]
    );
    // Only the kubeconfig is sensitive.
    let secret: Vec<&str> = plan
        .exports()
        .iter()
        .filter(|e| e.secret)
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(secret, ["kubeconfig"]);
}

/// Story: credentials loaded through the store never appear in the
/// serialized plan, only their token names do.
#[test]
fn story_no_secret_material_in_serialized_plan() {
    // The store holds no secret values at all, so the only thing that
    // can leak into the plan is a token name.
    let secrets = AppSecrets::from_config(&prod_store()).unwrap();
    assert_eq!(secrets.kafka_api_key.token(), "kafka_api_key");

    let plan = build_stack(&prod_params()).unwrap();
    let yaml = plan.to_yaml().unwrap();
    for token in [
        "mongo_username",
        "mongo_password",
        "platform_api_key",
        "platform_secret",
        "kafka_api_key",
        "kafka_api_secret",
    ] {
        assert!(yaml.contains(token), "token {} missing from plan", token);
    }
}
