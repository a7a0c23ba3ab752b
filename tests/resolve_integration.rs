//! End-to-end resolution flows through `resolve_all`, with every remote
//! endpoint mocked.

use storelinks::{
    ClientConfig, Endpoints, QueryError, ResolveRequest, StoreClient, Templates, resolve_all,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WU_PATH: &str = "/ClientWebService/client.asmx";
const WU_SECURED_PATH: &str = "/ClientWebService/client.asmx/secured";

fn client_for(server: &MockServer) -> StoreClient {
    StoreClient::new(ClientConfig {
        endpoints: Endpoints::with_base(&server.uri()),
        ..ClientConfig::default()
    })
    .expect("client should build")
}

fn templates() -> Templates {
    Templates {
        cookie: "<s:Envelope><GetCookie/></s:Envelope>".to_string(),
        file_list: "<s:Envelope><c>{cookie}</c><cat>{categoryId}</cat><r>{ring}</r></s:Envelope>"
            .to_string(),
        url: "<s:Envelope><u>{updateID}</u><rev>{revisionNumber}</rev><r>{ring}</r></s:Envelope>"
            .to_string(),
    }
}

/// Mounts the full packaged-app chain: catalog -> cookie -> file list ->
/// secured URL. Returns the moniker used in the WU data.
async fn mount_appx_chain(server: &MockServer) -> &'static str {
    let moniker = "Contoso.Notes_2.4.1.0_x64__8wekyb3d8bbwe";

    Mock::given(method("GET"))
        .and(path("/v9.0/products/9WZDNCRFJBH4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Payload": {
                "Title": "Contoso Notes",
                "PublisherName": "Contoso Ltd.",
                "Description": "Take notes.",
                "Skus": [
                    { "FulfillmentData": "{\"WuCategoryId\":\"cat-4711\"}" }
                ]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(WU_PATH))
        .and(body_string_contains("GetCookie"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<Envelope><EncryptedData>cookie-blob</EncryptedData></Envelope>",
        ))
        .mount(server)
        .await;

    // The file list arrives double-encoded inside the SOAP envelope.
    let escaped_file_list = format!(
        "<Envelope>\
         &lt;Updates&gt;\
         &lt;File InstallerSpecificIdentifier=\"{moniker}\" FileName=\"{moniker}.appx\" \
              Size=\"1572864\" Digest=\"DIG=\"/&gt;\
         &lt;Update&gt;\
         &lt;Properties&gt;&lt;SecuredFragment/&gt;&lt;/Properties&gt;\
         &lt;AppxMetadata PackageMoniker=\"{moniker}\"/&gt;\
         &lt;UpdateIdentity UpdateID=\"uid-77\" RevisionNumber=\"3\"/&gt;\
         &lt;/Update&gt;\
         &lt;/Updates&gt;\
         </Envelope>"
    );
    Mock::given(method("POST"))
        .and(path(WU_PATH))
        .and(body_string_contains("cookie-blob"))
        .respond_with(ResponseTemplate::new(200).set_body_string(escaped_file_list))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(WU_SECURED_PATH))
        .and(body_string_contains("uid-77"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<Envelope><FileLocation>\
             <FileDigest>dig=</FileDigest>\
             <Url>https://tlu.dl.example.com/files/contoso-notes.appx</Url>\
             </FileLocation></Envelope>",
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v9.0/packageManifests/9WZDNCRFJBH4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    moniker
}

#[tokio::test]
async fn test_resolve_all_packaged_app_end_to_end() {
    let server = MockServer::start().await;
    let moniker = mount_appx_chain(&server).await;

    let outcome = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("9WZDNCRFJBH4"),
        &CancellationToken::new(),
    )
    .await
    .expect("resolution should succeed");

    assert_eq!(outcome.product_id, "9WZDNCRFJBH4");
    let info = outcome.app_info.expect("catalog lookup succeeded");
    assert_eq!(info.name, "Contoso Notes");
    assert_eq!(info.category_id, "cat-4711");

    assert_eq!(outcome.appx_packages.len(), 1);
    let item = &outcome.appx_packages[0];
    assert_eq!(item.file_name, format!("{moniker}.appx"));
    assert_eq!(item.file_size, "1.5 MB");
    let link = url::Url::parse(&item.file_link).expect("file link must be a well-formed URL");
    assert!(link.path().ends_with(".appx"), "link must point at the package artifact");

    assert!(outcome.non_appx_packages.is_empty());
    assert!(outcome.errors.is_empty(), "unexpected degradations: {:?}", outcome.errors);
}

#[tokio::test]
async fn test_resolve_all_accepts_storefront_url_input() {
    let server = MockServer::start().await;
    mount_appx_chain(&server).await;

    let outcome = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("https://apps.microsoft.com/detail/9WZDNCRFJBH4?hl=en-us&gl=US"),
        &CancellationToken::new(),
    )
    .await
    .expect("resolution should succeed");

    assert_eq!(outcome.product_id, "9WZDNCRFJBH4");
    assert_eq!(outcome.appx_packages.len(), 1);
}

#[tokio::test]
async fn test_resolve_all_non_appx_product_skips_wu_path() {
    let server = MockServer::start().await;
    let installer_url = format!("{}/files/ContosoTool-3.0.exe", server.uri());

    // The catalog has no entry for unpackaged products and must never be
    // consulted for them.
    Mock::given(method("GET"))
        .and(path("/v9.0/products/XPDC2RH70K22MN"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v9.0/packageManifests/XPDC2RH70K22MN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Data": {
                "PackageIdentifier": "XPDC2RH70K22MN",
                "Versions": [{
                    "DefaultLocale": {
                        "PackageName": "Contoso Tool",
                        "Publisher": "Contoso Ltd.",
                        "ShortDescription": "A handy tool."
                    },
                    "Installers": [{
                        "InstallerType": "exe",
                        "InstallerUrl": installer_url,
                        "InstallerLocale": "en-US"
                    }]
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/files/ContosoTool-3.0.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let outcome = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("XPDC2RH70K22MN"),
        &CancellationToken::new(),
    )
    .await
    .expect("resolution should succeed");

    assert!(outcome.appx_packages.is_empty(), "xp products never take the WU path");
    assert_eq!(outcome.non_appx_packages.len(), 1);
    assert_eq!(outcome.non_appx_packages[0].file_name, "ContosoTool-3.0");
    assert_eq!(outcome.non_appx_packages[0].file_size, "4 KB");

    let info = outcome.app_info.expect("manifest supplies the display info");
    assert_eq!(info.name, "Contoso Tool");
    assert_eq!(info.publisher, "Contoso Ltd.");
    assert_eq!(info.description, "A handy tool.");
    assert!(outcome.errors.is_empty(), "unexpected degradations: {:?}", outcome.errors);
}

#[tokio::test]
async fn test_resolve_all_non_appx_product_missing_manifest_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v9.0/products/xpdc2rh70k22mn"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v9.0/packageManifests/xpdc2rh70k22mn"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcome = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("xpdc2rh70k22mn"),
        &CancellationToken::new(),
    )
    .await
    .expect("a missing manifest degrades, it does not fail");

    assert_eq!(outcome.product_id, "XPDC2RH70K22MN", "xp ids are reported uppercase");
    assert!(outcome.app_info.is_none());
    assert!(outcome.non_appx_packages.is_empty());
    assert!(
        outcome.errors.iter().any(|note| note.contains("not found")),
        "missing manifest should be recorded: {:?}",
        outcome.errors
    );
}

#[tokio::test]
async fn test_resolve_all_degrades_when_cookie_endpoint_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v9.0/products/9WZDNCRFJBH4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Payload": {
                "Title": "Contoso Notes",
                "Skus": [{ "FulfillmentData": "{\"WuCategoryId\":\"cat-4711\"}" }]
            }
        })))
        .mount(&server)
        .await;
    // Cookie endpoint answers 503, so the file list must be skipped.
    Mock::given(method("POST"))
        .and(path(WU_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v9.0/packageManifests/9WZDNCRFJBH4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcome = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("9WZDNCRFJBH4"),
        &CancellationToken::new(),
    )
    .await
    .expect("degraded resolution must still return an outcome");

    assert!(outcome.appx_packages.is_empty());
    assert!(
        outcome.errors.iter().any(|note| note.contains("cookie")),
        "cookie degradation should be recorded: {:?}",
        outcome.errors
    );
}

#[tokio::test]
async fn test_resolve_all_empty_input_is_invalid_argument() {
    let server = MockServer::start().await;
    let err = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("   "),
        &CancellationToken::new(),
    )
    .await
    .expect_err("blank input must fail fast");
    assert!(matches!(err, QueryError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_resolve_all_canceled_token_propagates() {
    let server = MockServer::start().await;
    mount_appx_chain(&server).await;
    let token = CancellationToken::new();
    token.cancel();

    let err = resolve_all(
        &client_for(&server),
        &templates(),
        &ResolveRequest::new("9WZDNCRFJBH4"),
        &token,
    )
    .await
    .expect_err("cancellation must propagate, not degrade");
    assert!(err.is_canceled(), "expected Canceled, got: {err}");
}
