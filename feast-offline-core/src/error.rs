use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeastCoreError {
    MalformedDescriptor {
        reason: String,
    },
    SchemaMismatch {
        feature_view_name: Option<String>,
        column: String,
        path: String,
    },
    UnknownFeatureView {
        feature_view_name: String,
        project: Option<String>,
    },
    UnknownStoreType {
        store_type: String,
    },
    AmbiguousFeatureName {
        feature_name: String,
        feature_view_names: Vec<String>,
    },
    InvalidFeatureRef {
        reference: String,
    },
    MissingTransform {
        on_demand_feature_view_name: String,
    },
}

impl FeastCoreError {
    pub fn malformed_descriptor(reason: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(
        feature_view_name: Option<&str>,
        column: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            feature_view_name: feature_view_name.map(str::to_owned),
            column: column.into(),
            path: path.into(),
        }
    }

    pub fn unknown_feature_view(feature_view_name: impl Into<String>) -> Self {
        Self::UnknownFeatureView {
            feature_view_name: feature_view_name.into(),
            project: None,
        }
    }

    pub fn unknown_feature_view_in_project(
        feature_view_name: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self::UnknownFeatureView {
            feature_view_name: feature_view_name.into(),
            project: Some(project.into()),
        }
    }

    pub fn unknown_store_type(store_type: impl Into<String>) -> Self {
        Self::UnknownStoreType {
            store_type: store_type.into(),
        }
    }

    pub fn ambiguous_feature_name(
        feature_name: impl Into<String>,
        feature_view_names: Vec<String>,
    ) -> Self {
        Self::AmbiguousFeatureName {
            feature_name: feature_name.into(),
            feature_view_names,
        }
    }

    pub fn invalid_feature_ref(reference: impl Into<String>) -> Self {
        Self::InvalidFeatureRef {
            reference: reference.into(),
        }
    }

    pub fn missing_transform(on_demand_feature_view_name: impl Into<String>) -> Self {
        Self::MissingTransform {
            on_demand_feature_view_name: on_demand_feature_view_name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownFeatureView { .. })
    }
}

impl Display for FeastCoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedDescriptor { reason } => {
                write!(f, "Malformed data source descriptor: {}", reason)
            }
            Self::SchemaMismatch {
                feature_view_name: Some(view),
                column,
                path,
            } => write!(
                f,
                "Column '{}' required by feature view '{}' is missing from '{}'",
                column, view, path
            ),
            Self::SchemaMismatch {
                feature_view_name: None,
                column,
                path,
            } => write!(f, "Column '{}' is missing from '{}'", column, path),
            Self::UnknownFeatureView {
                feature_view_name,
                project: Some(project),
            } => write!(
                f,
                "Feature view '{}' not found in project '{}'",
                feature_view_name, project
            ),
            Self::UnknownFeatureView {
                feature_view_name,
                project: None,
            } => write!(f, "Feature view '{}' not found", feature_view_name),
            Self::UnknownStoreType { store_type } => write!(
                f,
                "Unknown offline store type '{}', available types: [file, custom_file]",
                store_type
            ),
            Self::AmbiguousFeatureName {
                feature_name,
                feature_view_names,
            } => write!(
                f,
                "Feature name '{}' is provided by feature views [{}]; set full_feature_names to qualify output columns",
                feature_name,
                feature_view_names.join(", ")
            ),
            Self::InvalidFeatureRef { reference } => write!(
                f,
                "Invalid feature reference '{}', expected '<feature_view>:<feature>'",
                reference
            ),
            Self::MissingTransform {
                on_demand_feature_view_name,
            } => write!(
                f,
                "No transform registered for on-demand feature view '{}'",
                on_demand_feature_view_name
            ),
        }
    }
}

impl std::error::Error for FeastCoreError {}
