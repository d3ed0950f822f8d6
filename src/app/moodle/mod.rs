//! Moodle REST web-service client
//!
//! Calls are form POSTs to `/webservice/rest/server.php` authenticated with the
//! token issued by the mobile launch flow. Failures surface as [`MoodleError`]
//! and end the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::app::client::http::ensure_success;
use crate::app::client::SessionClient;
use crate::app::coordinator::CourseCatalog;
use crate::app::models::{ContentNode, CourseInfo, SiteInfo};
use crate::app::walker::resolve_language;
use crate::constants::moodle;
use crate::errors::{DownloadError, MoodleError, MoodleResult, Result};

pub mod types;

pub use types::{build_content_tree, rewrite_file_url, CategoryIndex};
use types::{RawCategory, RawCourse, RawException, RawSection};

const SITE_INFO: &str = "core_webservice_get_site_info";
const GET_CATEGORIES: &str = "core_course_get_categories";
const GET_USER_COURSES: &str = "core_enrol_get_users_courses";
const GET_CONTENTS: &str = "core_course_get_contents";

/// Options passed to `core_course_get_contents`
const CONTENT_OPTIONS: &[(&str, &str)] = &[
    ("excludemodules", "0"),
    ("excludecontents", "0"),
    ("includestealthmodules", "1"),
];

type Params = Vec<(String, String)>;

fn param(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

/// Client bound to one site and one web-service token
pub struct MoodleClient {
    session: Arc<SessionClient>,
    endpoint: Url,
    token: String,
    site: SiteInfo,
    preferred_language: String,
}

impl MoodleClient {
    /// Connects with `token` and fetches the site and user identity
    ///
    /// # Errors
    ///
    /// Returns `MoodleError` if the token is rejected or the site unreachable
    pub async fn connect(
        session: Arc<SessionClient>,
        token: impl Into<String>,
        preferred_language: impl Into<String>,
    ) -> MoodleResult<Self> {
        let endpoint = session
            .base_url()
            .join(moodle::REST_PATH)
            .map_err(|_| MoodleError::InvalidUrl {
                url: session.base_url().to_string(),
            })?;

        let mut client = Self {
            session,
            endpoint,
            token: token.into(),
            site: SiteInfo {
                sitename: String::new(),
                fullname: String::new(),
                userid: 0,
                userprivateaccesskey: None,
            },
            preferred_language: preferred_language.into(),
        };
        client.site = client.call(SITE_INFO, Vec::new()).await?;
        tracing::info!(
            "Connected to '{}' as {}",
            client.site.sitename,
            client.site.fullname
        );
        Ok(client)
    }

    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    /// Invokes a web-service function and decodes its JSON result
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        params: Params,
    ) -> MoodleResult<T> {
        let mut form = vec![
            param("wstoken", &self.token),
            param("wsfunction", function),
            param("moodlewsrestformat", "json"),
        ];
        form.extend(params);

        tracing::debug!("Calling {}", function);
        let response = ensure_success(self.session.http().post_form(&self.endpoint, &form).await?)?;
        let body = response.text().await.map_err(DownloadError::Http)?;
        decode_response(function, &body)
    }

    async fn categories(&self) -> MoodleResult<CategoryIndex> {
        let categories: Vec<RawCategory> = self
            .call(GET_CATEGORIES, vec![param("moodlewssettinglang", moodle::PREFERRED_LANGUAGE)])
            .await?;
        Ok(CategoryIndex::new(categories, &self.preferred_language))
    }

    async fn courses(&self) -> MoodleResult<Vec<RawCourse>> {
        self.call(
            GET_USER_COURSES,
            vec![
                param("userid", self.site.userid),
                param("returnusercount", 0),
                param("moodlewssettingfilter", 1),
                param("moodlewssettingfileurl", 1),
                param("moodlewssettinglang", moodle::PREFERRED_LANGUAGE),
            ],
        )
        .await
    }

    async fn sections(&self, course_id: i64) -> MoodleResult<Vec<RawSection>> {
        let mut params = vec![param("courseid", course_id)];
        for (i, (name, value)) in CONTENT_OPTIONS.iter().enumerate() {
            params.push(param(&format!("options[{i}][name]"), name));
            params.push(param(&format!("options[{i}][value]"), value));
        }
        self.call(GET_CONTENTS, params).await
    }
}

/// Decodes a web-service response, turning exception objects into errors
fn decode_response<T: DeserializeOwned>(function: &str, body: &str) -> MoodleResult<T> {
    let decode_error = |source| MoodleError::Decode {
        function: function.to_string(),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(body).map_err(decode_error)?;
    if value.get("exception").is_some() {
        let exception: RawException = serde_json::from_value(value).map_err(decode_error)?;
        tracing::debug!("{} raised {}", function, exception.exception);
        return Err(MoodleError::Api {
            function: function.to_string(),
            errorcode: exception.errorcode,
            message: exception.message,
        });
    }
    serde_json::from_value(value).map_err(decode_error)
}

#[async_trait]
impl CourseCatalog for MoodleClient {
    async fn list_courses(&self) -> Result<Vec<CourseInfo>> {
        tracing::info!("Fetching course categories");
        let categories = self.categories().await?;
        tracing::info!("Fetching courses");
        let courses = self.courses().await?;

        Ok(courses
            .into_iter()
            .map(|course| CourseInfo {
                id: course.id,
                category_path: course
                    .category
                    .map(|id| categories.path_of(id))
                    .unwrap_or_default(),
                name: resolve_language(&course.fullname, &self.preferred_language),
            })
            .collect())
    }

    async fn course_contents(&self, course_id: i64) -> Result<ContentNode> {
        let sections = self.sections(course_id).await?;
        Ok(build_content_tree(
            sections,
            self.site.userprivateaccesskey.as_deref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::app::client::{ClientConfig, PersistentCookieJar};
    use crate::errors::AppError;

    fn session(server: &MockServer) -> Arc<SessionClient> {
        let config = ClientConfig {
            retry_base_delay: Duration::from_millis(1),
            rate_limit_rps: 1000,
            ..Default::default()
        };
        Arc::new(
            SessionClient::new(
                Url::parse(&server.uri()).unwrap(),
                &config,
                Arc::new(PersistentCookieJar::default()),
            )
            .unwrap(),
        )
    }

    async fn mount(server: &MockServer, function: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/webservice/rest/server.php"))
            .and(body_string_contains(format!("wsfunction={function}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_site_info(server: &MockServer) {
        mount(
            server,
            SITE_INFO,
            serde_json::json!({
                "sitename": "e-Learning UniMiB",
                "fullname": "Mario Rossi",
                "userid": 77,
                "userprivateaccesskey": "pk"
            }),
        )
        .await;
    }

    #[tokio::test]
    async fn test_connect_reads_site_info() {
        let server = MockServer::start().await;
        mount_site_info(&server).await;

        let client = MoodleClient::connect(session(&server), "tok", "it").await.unwrap();
        assert_eq!(client.site().userid, 77);
        assert_eq!(client.site().userprivateaccesskey.as_deref(), Some("pk"));
    }

    /// Test web-service exceptions
    ///
    /// Verifies that an exception object is reported as an API error rather
    /// than a decoding failure.
    #[tokio::test]
    async fn test_exception_becomes_api_error() {
        let server = MockServer::start().await;
        mount(
            &server,
            SITE_INFO,
            serde_json::json!({
                "exception": "moodle_exception",
                "errorcode": "invalidtoken",
                "message": "Token non valido"
            }),
        )
        .await;

        let result = MoodleClient::connect(session(&server), "bad", "it").await;
        match result {
            Err(MoodleError::Api { errorcode, .. }) => assert_eq!(errorcode, "invalidtoken"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("connect should fail"),
        }
    }

    /// Test course listing
    ///
    /// Ensures courses carry resolved names and the resolved names of their
    /// category ancestry.
    #[tokio::test]
    async fn test_list_courses() {
        let server = MockServer::start().await;
        mount_site_info(&server).await;
        mount(
            &server,
            GET_CATEGORIES,
            serde_json::json!([
                {"id": 1, "name": "Scienze", "path": "/1"},
                {"id": 4, "name": "{mlang en}Computer Science{mlang}{mlang it}Informatica{mlang}", "path": "/1/4"}
            ]),
        )
        .await;
        Mock::given(method("POST"))
            .and(body_string_contains(format!("wsfunction={GET_USER_COURSES}")))
            .and(body_string_contains("userid=77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 300, "fullname": "Analisi I", "category": 4},
                {"id": 301, "fullname": "Seminario", "category": null}
            ])))
            .mount(&server)
            .await;

        let client = MoodleClient::connect(session(&server), "tok", "it").await.unwrap();
        let courses = client.list_courses().await.unwrap();

        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].path(), vec!["Scienze", "Informatica", "Analisi I"]);
        assert_eq!(courses[1].path(), vec!["Seminario"]);
    }

    #[tokio::test]
    async fn test_course_contents_sends_options() {
        let server = MockServer::start().await;
        mount_site_info(&server).await;
        Mock::given(method("POST"))
            .and(body_string_contains(format!("wsfunction={GET_CONTENTS}")))
            .and(body_string_contains("courseid=300"))
            .and(body_string_contains("includestealthmodules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Generale", "modules": [
                    {"id": 9, "name": "Slide", "modname": "resource",
                     "contents": [{"type": "file", "filename": "a.pdf", "filesize": 3,
                                   "fileurl": format!("{}/webservice/pluginfile.php/9/a.pdf", server.uri())}]}
                ]}
            ])))
            .mount(&server)
            .await;

        let client = MoodleClient::connect(session(&server), "tok", "it").await.unwrap();
        let tree = client.course_contents(300).await.unwrap();
        assert_eq!(tree.children()[0].children().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_contents_are_fatal() {
        let server = MockServer::start().await;
        mount_site_info(&server).await;
        mount(&server, GET_CONTENTS, serde_json::json!({"unexpected": true})).await;

        let client = MoodleClient::connect(session(&server), "tok", "it").await.unwrap();
        let result = client.course_contents(1).await;
        assert!(matches!(
            result,
            Err(AppError::Moodle(MoodleError::Decode { .. }))
        ));
    }
}
