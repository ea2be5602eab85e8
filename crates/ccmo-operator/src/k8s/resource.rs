use k8s_openapi::{
    api::{
        admissionregistration::v1::{ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding},
        apps::v1::{DaemonSet, Deployment},
        core::v1::{ConfigMap, Service},
        policy::v1::PodDisruptionBudget,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{ApiResource, DynamicObject},
    Resource as KubeResource,
};
use serde::Serialize;

/// Declares the closed set of object types the operator renders and applies, together with
/// a matching kind tag used as decode target for templates.
macro_rules! operand_resources {
    ($($variant:ident($ty:ty) => $namespaced:literal),+ $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum Resource {
            $($variant($ty)),+
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ResourceKind {
            $($variant),+
        }

        impl Resource {
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Resource::$variant(_) => ResourceKind::$variant),+
                }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $(Resource::$variant(o) => o.meta()),+
                }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Resource::$variant(o) => o.meta_mut()),+
                }
            }
        }

        impl ResourceKind {
            pub fn api_resource(&self) -> ApiResource {
                match self {
                    $(ResourceKind::$variant => ApiResource::erase::<$ty>(&())),+
                }
            }

            pub fn is_namespaced(&self) -> bool {
                match self {
                    $(ResourceKind::$variant => $namespaced),+
                }
            }

            /// Deserializes into the typed object for this kind.
            pub fn decode(&self, value: serde_json::Value) -> Result<Resource, serde_json::Error> {
                match self {
                    $(ResourceKind::$variant => serde_json::from_value::<$ty>(value).map(Resource::$variant)),+
                }
            }

            /// Resolves `apiVersion` + `kind` to one of the known kinds.
            pub fn from_type_meta(api_version: &str, kind: &str) -> Option<ResourceKind> {
                [$(ResourceKind::$variant),+]
                    .into_iter()
                    .find(|k| {
                        let ar = k.api_resource();
                        ar.api_version == api_version && ar.kind == kind
                    })
            }
        }
    };
}

operand_resources! {
    Deployment(Deployment) => true,
    DaemonSet(DaemonSet) => true,
    ConfigMap(ConfigMap) => true,
    Service(Service) => true,
    Role(Role) => true,
    RoleBinding(RoleBinding) => true,
    ClusterRole(ClusterRole) => false,
    ClusterRoleBinding(ClusterRoleBinding) => false,
    PodDisruptionBudget(PodDisruptionBudget) => true,
    ValidatingAdmissionPolicy(ValidatingAdmissionPolicy) => false,
    ValidatingAdmissionPolicyBinding(ValidatingAdmissionPolicyBinding) => false,
}

impl ResourceKind {
    /// `Kind.group`, or just `Kind` for the core group.
    pub fn group_kind(&self) -> String {
        let ar = self.api_resource();
        format_group_kind(&ar.group, &ar.kind)
    }
}

pub fn format_group_kind(group: &str, kind: &str) -> String {
    if group.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}.{group}")
    }
}

impl Resource {
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    pub fn generation(&self) -> Option<i64> {
        self.meta().generation
    }

    pub fn group_kind(&self) -> String {
        self.kind().group_kind()
    }

    /// Untyped form used for server side apply and for the watcher.
    pub fn to_dynamic(&self) -> Result<DynamicObject, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

macro_rules! impl_from {
    ($($variant:ident),+ $(,)?) => {
        $(impl From<$variant> for Resource {
            fn from(value: $variant) -> Self {
                Resource::$variant(value)
            }
        })+
    };
}

impl_from!(
    Deployment,
    DaemonSet,
    ConfigMap,
    Service,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    PodDisruptionBudget,
    ValidatingAdmissionPolicy,
    ValidatingAdmissionPolicyBinding,
);
