use crate::error::ApiErrorResponse;
use crate::routes::versions::UploadForm;
use appstore_catalog::{Application, CreateApplicationRequest, PackageVersion};
use appstore_store::VerifyReport;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::apps::create_application,
        crate::routes::apps::list_applications,
        crate::routes::apps::get_application,
        crate::routes::versions::list_versions,
        crate::routes::versions::upload_version,
        crate::routes::versions::latest_version,
        crate::routes::versions::download_version,
        crate::routes::versions::verify_version,
    ),
    components(
        schemas(
            Application,
            CreateApplicationRequest,
            PackageVersion,
            VerifyReport,
            UploadForm,
            ApiErrorResponse
        )
    ),
    tags(
        (name = "appstore", description = "Application package store API")
    )
)]
pub struct ApiDoc;
