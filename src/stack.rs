//! The parameterized EKS deployment stack.
//!
//! [`build_stack`] assembles the complete deployment plan for one
//! environment: VPC, IAM roles, EKS cluster, provider context, RBAC,
//! namespace, credentials, and the application workloads, plus the
//! stack's exports. Everything that varies between environments
//! (account, sizing, images, which optional pieces are present) lives
//! in [`StackParams`]; one parameter set describes one environment.
//!
//! Parameters load from a [`ConfigStore`] under these keys:
//!
//! | key | required | meaning |
//! |---|---|---|
//! | `stack_name` | yes | prefix for resource names and RBAC identities |
//! | `admin_account_arn` | yes | principal allowed to assume the admin role |
//! | `app_image` | yes | application container image |
//! | `vpc_cidr` | no (`10.0.0.0/16`) | VPC address range |
//! | `availability_zones` | no (`2`) | AZ spread |
//! | `instance_type` | no (`m5.large`) | worker instance type |
//! | `min_size` / `desired_capacity` / `max_size` | no (`1`/`2`/`3`) | node group bounds |
//! | `service_cidr` | no (`172.20.0.0/16`) | cluster service range |
//! | `app_namespace` | no (`apps`) | namespace the workloads run in |
//! | `workload_secrets` | no (`false`) | load [`AppSecrets`] keys when `true` |
//! | `bootstrap_properties_path` | no | enables the bootstrap job; file content becomes the ConfigMap |
//! | `bootstrap_image` | with bootstrap | bootstrap container image |
//! | `bootstrap_args` | no | `BOOTSTRAP_ARGS` value for the bootstrap container |

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::builder::PlanBuilder;
use crate::cidr::CidrBlock;
use crate::cluster::{ClusterSpec, NodeSizing, ProviderContextSpec, RoleMapping};
use crate::config::{read_config_file, ConfigStore};
use crate::error::{Error, Result};
use crate::graph::{
    validate_dns_label, AttributeRef, ATTR_ARN, ATTR_KUBECONFIG, ATTR_NAME, ATTR_NAT_PUBLIC_IPS,
    ATTR_VPC_ID,
};
use crate::iam::{
    Principal, RoleSpec, TrustPolicy, POLICY_ECR_READONLY, POLICY_EKS_CNI, POLICY_EKS_WORKER_NODE,
    SERVICE_PRINCIPAL_EC2,
};
use crate::network::{NatStrategy, NetworkSpec, SubnetKind};
use crate::plan::DeploymentPlan;
use crate::rbac::{ClusterRoleSpec, PolicyRule, RoleBindingSpec, Subject};
use crate::secret::{SecretRef, SecretSpec};
use crate::workload::{
    ConfigMapSpec, EnvEntry, NamespaceSpec, PullPolicy, WorkloadSpec,
};

/// Name of the Secret carrying application credentials.
pub const APP_SECRETS_NAME: &str = "app-secrets";

/// Name of the ConfigMap carrying bootstrap properties.
pub const BOOTSTRAP_CONFIG_NAME: &str = "bootstrap-config";

/// File name the bootstrap properties are exposed under.
pub const BOOTSTRAP_PROPERTIES_FILE: &str = "bootstrap.properties";

/// Mount path of the bootstrap config volume.
pub const BOOTSTRAP_MOUNT_PATH: &str = "/etc/config";

/// Credential references for the application workloads.
///
/// Every sensitive field is a [`SecretRef`] token into the external
/// store. The one inline field, `mongo_endpoint`, is a hostname that
/// lives in the same Secret object for the application's convenience
/// but is not itself sensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppSecrets {
    /// Database username.
    pub mongo_username: SecretRef,
    /// Database password.
    pub mongo_password: SecretRef,
    /// Control-plane API key.
    pub platform_api_key: SecretRef,
    /// Control-plane API secret.
    pub platform_secret: SecretRef,
    /// Kafka cluster API key.
    pub kafka_api_key: SecretRef,
    /// Kafka cluster API secret.
    pub kafka_api_secret: SecretRef,
    /// Database hostname, carried inline.
    pub mongo_endpoint: String,
}

impl AppSecrets {
    /// Load the credential references from a configuration store.
    ///
    /// Secret keys yield tokens only; the store never hands the builder
    /// a secret value.
    pub fn from_config(store: &dyn ConfigStore) -> Result<Self> {
        Ok(Self {
            mongo_username: store.require_secret("mongo_username")?,
            mongo_password: store.require_secret("mongo_password")?,
            platform_api_key: store.require_secret("platform_api_key")?,
            platform_secret: store.require_secret("platform_secret")?,
            kafka_api_key: store.require_secret("kafka_api_key")?,
            kafka_api_secret: store.require_secret("kafka_api_secret")?,
            mongo_endpoint: store.require("mongo_endpoint")?,
        })
    }

    fn secret_spec(&self, namespace: &str) -> SecretSpec {
        SecretSpec::new(APP_SECRETS_NAME, namespace)
            .with_reference("MONGO_USERNAME", self.mongo_username.clone())
            .with_reference("MONGO_PASSWORD", self.mongo_password.clone())
            .with_reference("PLATFORM_API_KEY", self.platform_api_key.clone())
            .with_reference("PLATFORM_SECRET", self.platform_secret.clone())
            .with_reference("KAFKA_API_KEY", self.kafka_api_key.clone())
            .with_reference("KAFKA_API_SECRET", self.kafka_api_secret.clone())
            .with_literal("MONGO_ENDPOINT", &self.mongo_endpoint)
    }
}

/// The one-shot bootstrap job and its mounted configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapParams {
    /// Bootstrap container image.
    pub image: String,
    /// Properties file content, mounted at
    /// [`BOOTSTRAP_MOUNT_PATH`]`/`[`BOOTSTRAP_PROPERTIES_FILE`].
    pub properties: String,
    /// Value for the container's `BOOTSTRAP_ARGS` variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Everything that varies between deployments of this stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackParams {
    /// Stack name, prefixed onto resource names and RBAC identities.
    pub stack_name: String,
    /// Principal granted sts:AssumeRole on the cluster admin role.
    pub admin_account_arn: String,
    /// VPC address range.
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: CidrBlock,
    /// Availability zones the VPC spans.
    #[serde(default = "default_availability_zones")]
    pub availability_zones: u32,
    /// Worker node instance type.
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Minimum node count.
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    /// Node count the group scales to at creation.
    #[serde(default = "default_desired_capacity")]
    pub desired_capacity: u32,
    /// Maximum node count.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Cluster service address range.
    #[serde(default = "default_service_cidr")]
    pub service_cidr: CidrBlock,
    /// Namespace the application workloads run in.
    #[serde(default = "default_app_namespace")]
    pub app_namespace: String,
    /// Application container image, also used by the generator.
    pub app_image: String,
    /// Application credentials. When absent, no Secret object is
    /// declared and the workloads run without injected credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secrets: Option<AppSecrets>,
    /// Bootstrap job. When absent, neither the ConfigMap nor the
    /// bootstrap workload is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapParams>,
}

fn default_vpc_cidr() -> CidrBlock {
    CidrBlock::from_parts(Ipv4Addr::new(10, 0, 0, 0), 16)
}

fn default_availability_zones() -> u32 {
    2
}

fn default_instance_type() -> String {
    "m5.large".to_string()
}

fn default_min_size() -> u32 {
    1
}

fn default_desired_capacity() -> u32 {
    2
}

fn default_max_size() -> u32 {
    3
}

fn default_service_cidr() -> CidrBlock {
    CidrBlock::from_parts(Ipv4Addr::new(172, 20, 0, 0), 16)
}

fn default_app_namespace() -> String {
    "apps".to_string()
}

fn parse_or<T>(store: &dyn ConfigStore, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match store.get(key) {
        Some(raw) => raw.parse().map_err(|e| {
            Error::validation_field(
                "StackParams",
                key,
                format!("could not parse '{}': {}", raw, e),
            )
        }),
        None => Ok(default),
    }
}

impl StackParams {
    /// Load parameters from a configuration store. See the module doc
    /// for the key table.
    pub fn from_config(store: &dyn ConfigStore) -> Result<Self> {
        let app_secrets = if parse_or(store, "workload_secrets", false)? {
            Some(AppSecrets::from_config(store)?)
        } else {
            None
        };
        let bootstrap = match store.get("bootstrap_properties_path") {
            Some(path) => Some(BootstrapParams {
                image: store.require("bootstrap_image")?,
                properties: read_config_file(&path)?,
                arguments: store.get("bootstrap_args"),
            }),
            None => None,
        };
        Ok(Self {
            stack_name: store.require("stack_name")?,
            admin_account_arn: store.require("admin_account_arn")?,
            vpc_cidr: parse_or(store, "vpc_cidr", default_vpc_cidr())?,
            availability_zones: parse_or(store, "availability_zones", default_availability_zones())?,
            instance_type: store.get("instance_type").unwrap_or_else(default_instance_type),
            min_size: parse_or(store, "min_size", default_min_size())?,
            desired_capacity: parse_or(store, "desired_capacity", default_desired_capacity())?,
            max_size: parse_or(store, "max_size", default_max_size())?,
            service_cidr: parse_or(store, "service_cidr", default_service_cidr())?,
            app_namespace: store.get("app_namespace").unwrap_or_else(default_app_namespace),
            app_image: store.require("app_image")?,
            app_secrets,
            bootstrap,
        })
    }

    /// Validate the parameters that only this layer can check. Spec
    /// invariants (sizing bounds, CIDR fits, endpoint access) are
    /// enforced by the builder operations downstream.
    pub fn validate(&self) -> Result<()> {
        validate_dns_label("StackParams", "stackName", &self.stack_name)?;
        if !self.admin_account_arn.starts_with("arn:") {
            return Err(Error::validation_field(
                "StackParams",
                "adminAccountArn",
                format!("'{}' is not an ARN", self.admin_account_arn),
            ));
        }
        if self.app_image.is_empty() {
            return Err(Error::validation_field(
                "StackParams",
                "appImage",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Assemble the deployment plan for one environment.
///
/// Declaration order follows the provisioning story: network and IAM
/// first, then the cluster and its provider context, RBAC, the
/// namespace, credentials and configuration, and the workloads last.
/// Exports cover the values an operator needs after apply: the
/// kubeconfig (secret), the VPC id and NAT addresses, the cluster name,
/// the admin role ARN, and the ready-to-run update-kubeconfig command.
pub fn build_stack(params: &StackParams) -> Result<DeploymentPlan> {
    params.validate()?;
    info!(stack = %params.stack_name, "building deployment plan");

    let mut builder = PlanBuilder::new();

    let network = builder.build_network(
        NetworkSpec::new(format!("{}-vpc", params.stack_name), params.vpc_cidr)
            .with_az_count(params.availability_zones)
            .with_nat(NatStrategy::Single)
            .with_subnet(SubnetKind::Public, 19, "public-frontend")
            .with_subnet(SubnetKind::Private, 18, "backend"),
    )?;

    let admin_role = builder.build_trust_role(
        RoleSpec::new(
            format!("{}-cluster-admin", params.stack_name),
            TrustPolicy::assume_role(Principal::Aws(params.admin_account_arn.clone())),
        )
        .with_tag(
            "clusterAccess",
            format!("{}-cluster-admin-usr", params.stack_name),
        ),
    )?;

    let node_role = builder.build_trust_role(
        RoleSpec::new(
            format!("{}-node-role", params.stack_name),
            TrustPolicy::assume_role(Principal::Service(SERVICE_PRINCIPAL_EC2.to_string())),
        )
        .with_attachment("cr-readonly", POLICY_ECR_READONLY)
        .with_attachment("cni", POLICY_EKS_CNI)
        .with_attachment("worker", POLICY_EKS_WORKER_NODE),
    )?;

    let admin_username = format!("{}:admin-usr", params.stack_name);
    let admin_group = format!("{}:admin-grp", params.stack_name);

    let cluster = builder.build_cluster(
        ClusterSpec::new(
            format!("{}-cluster", params.stack_name),
            network.clone(),
            node_role,
            NodeSizing::new(
                &params.instance_type,
                params.min_size,
                params.desired_capacity,
                params.max_size,
            ),
            params.service_cidr,
        )
        .with_role_mapping(RoleMapping::new(
            admin_role.clone(),
            vec![admin_group],
            &admin_username,
        )),
    )?;

    let provider = builder.build_provider_context(ProviderContextSpec::new(
        format!("{}-provider", params.stack_name),
        cluster.clone(),
    ))?;

    builder.build_cluster_role(
        ClusterRoleSpec::new("cluster-admin-role").with_rule(PolicyRule::wildcard()),
        &provider,
    )?;
    builder.build_cluster_role_binding(
        RoleBindingSpec::cluster_scoped("cluster-admin-role-binding", "cluster-admin-role")
            .with_subject(Subject::user(&admin_username)),
        &provider,
    )?;

    let namespace = builder.build_namespace(NamespaceSpec::new(&params.app_namespace), &provider)?;

    let mut app = WorkloadSpec::new("app", &params.app_namespace, &params.app_image)
        .with_pull_policy(PullPolicy::Always)
        .with_env(EnvEntry::field_ref("POD_IP", "status.podIP"));
    let mut generator = WorkloadSpec::new("generator", &params.app_namespace, &params.app_image)
        .with_pull_policy(PullPolicy::Always)
        .with_env(EnvEntry::literal("ARGS", "--generator"))
        .with_termination_grace(10);

    if let Some(secrets) = &params.app_secrets {
        builder.build_secret(secrets.secret_spec(&params.app_namespace), &namespace, &provider)?;
        app = app.with_env_from_secret(APP_SECRETS_NAME);
        generator = generator.with_env_from_secret(APP_SECRETS_NAME);
    }

    builder.build_workload(app, &namespace, &provider)?;
    builder.build_workload(generator, &namespace, &provider)?;

    if let Some(bootstrap) = &params.bootstrap {
        builder.build_config_map(
            ConfigMapSpec::new(BOOTSTRAP_CONFIG_NAME, &params.app_namespace)
                .with_entry(BOOTSTRAP_PROPERTIES_FILE, &bootstrap.properties),
            &namespace,
            &provider,
        )?;
        let mut workload =
            WorkloadSpec::new("bootstrap", &params.app_namespace, &bootstrap.image)
                .with_pull_policy(PullPolicy::Always)
                .with_config_mount(BOOTSTRAP_CONFIG_NAME, BOOTSTRAP_MOUNT_PATH);
        if let Some(args) = &bootstrap.arguments {
            workload = workload.with_env(EnvEntry::literal("BOOTSTRAP_ARGS", args));
        }
        builder.build_workload(workload, &namespace, &provider)?;
    }

    builder.export_secret_attribute("kubeconfig", &cluster, ATTR_KUBECONFIG)?;
    builder.export_attribute("vpcId", &network, ATTR_VPC_ID)?;
    builder.export_attribute("natPublicIps", &network, ATTR_NAT_PUBLIC_IPS)?;
    builder.export_attribute("clusterName", &cluster, ATTR_NAME)?;
    builder.export_attribute("clusterAdminRoleArn", &admin_role, ATTR_ARN)?;
    builder.export_command(
        "updateKubeCmd",
        "aws eks update-kubeconfig --name {} --role-arn {}",
        vec![
            AttributeRef::new(cluster, ATTR_NAME),
            AttributeRef::new(admin_role, ATTR_ARN),
        ],
    )?;

    builder.finish()
}
