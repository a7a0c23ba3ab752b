//! Appx package correlation and download URL resolution.
//!
//! The WU file list describes packaged artifacts across two disjoint sets of
//! elements. `File` elements carry per-file metadata (installer identifier,
//! name, size, content digest). `SecuredFragment` elements mark packages
//! whose download URL must be fetched through the secured endpoint; the
//! identity needed for that call (`UpdateID`/`RevisionNumber`) and the
//! package moniker live on sibling subtrees of a shared ancestor.
//!
//! Correlation is index-first: one pass over the tree tags every element
//! that transitively contains both an `AppxMetadata` and an
//! `UpdateIdentity` descendant, then each `SecuredFragment` binds to its
//! nearest tagged ancestor. The secured round trip runs once per surviving
//! fragment, concurrently, and a failed fragment contributes a placeholder
//! rather than aborting the batch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use roxmltree::{Document, Node};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::client::StoreClient;
use crate::error::QueryError;
use crate::format::format_bytes;
use crate::model::DownloadItem;
use crate::soap::render_template;

use super::{attr_named, descendant_named};

/// Per-file metadata extracted from a `File` element.
#[derive(Debug, Clone, PartialEq)]
struct FileDescriptor {
    /// Extension of the carried file, including the dot; empty when the
    /// file name has none.
    extension: String,
    /// Declared size in bytes; unparsable attribute text counts as zero.
    size_bytes: u64,
    /// Content digest used to pick the matching download URL.
    digest: String,
}

/// One secured fragment after correlation, ready for URL resolution.
#[derive(Debug, Clone)]
struct AppxJob {
    moniker: String,
    extension: String,
    size_bytes: u64,
    digest: String,
    update_id: String,
    revision_number: String,
}

impl StoreClient {
    /// Resolves every packaged artifact in a WU file-list document.
    ///
    /// An empty `file_list_xml` yields an empty list. Each correlated
    /// fragment performs its own secured round trip concurrently; a
    /// fragment whose round trip hits a transport failure still appears in
    /// the result with an empty link. Element order in the result is
    /// unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArgument`] when `ring` or
    /// `url_template` is empty, [`QueryError::Parse`] when the file list is
    /// not well-formed XML, and [`QueryError::Canceled`] when the token
    /// fires before the batch completes.
    #[instrument(skip_all, fields(ring))]
    pub async fn get_appx_packages(
        &self,
        file_list_xml: &str,
        ring: &str,
        url_template: &str,
        token: &CancellationToken,
    ) -> Result<Vec<DownloadItem>, QueryError> {
        if file_list_xml.trim().is_empty() {
            return Ok(Vec::new());
        }
        if ring.trim().is_empty() {
            return Err(QueryError::missing("ring"));
        }
        if url_template.trim().is_empty() {
            return Err(QueryError::missing("url_template"));
        }

        // The parsed tree borrows the input, so correlation happens eagerly
        // and only owned jobs cross into the spawned tasks.
        let jobs = {
            let doc = Document::parse(file_list_xml)
                .map_err(|err| QueryError::parse("file-list", err.to_string()))?;
            let descriptors = collect_file_descriptors(&doc);
            collect_appx_jobs(&doc, &descriptors)
        };
        debug!(job_count = jobs.len(), "correlated secured fragments");

        let results = Arc::new(Mutex::new(Vec::with_capacity(jobs.len())));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let client = self.clone();
            let ring = ring.to_string();
            let template = url_template.to_string();
            let token = token.clone();
            let results = Arc::clone(&results);

            handles.push(tokio::spawn(async move {
                let link = match client
                    .get_appx_url(
                        &job.update_id,
                        &job.revision_number,
                        &ring,
                        &job.digest,
                        &template,
                        &token,
                    )
                    .await
                {
                    Ok(url) => url,
                    Err(QueryError::Canceled) => return,
                    Err(err @ QueryError::Transport { .. }) => {
                        // Degrade this fragment to a placeholder; the rest
                        // of the batch is unaffected.
                        warn!(moniker = %job.moniker, error = %err, "secured URL lookup failed");
                        String::new()
                    }
                    Err(err) => {
                        warn!(moniker = %job.moniker, error = %err, "skipping fragment");
                        return;
                    }
                };

                let item = DownloadItem {
                    file_name: format!("{}{}", job.moniker, job.extension),
                    file_link: link,
                    file_size: format_bytes(job.size_bytes),
                };
                if let Ok(mut guard) = results.lock() {
                    guard.push(item);
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "secured URL task failed to join");
            }
        }

        if token.is_cancelled() {
            return Err(QueryError::Canceled);
        }

        let items = match Arc::try_unwrap(results) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner),
            // All tasks are joined, so this arm is unreachable in practice.
            Err(shared) => shared.lock().map(|guard| guard.clone()).unwrap_or_default(),
        };
        Ok(items)
    }

    /// Fetches the signed download URL for one package via the secured
    /// endpoint, selecting the `FileLocation` whose digest matches.
    ///
    /// Returns an empty string when the endpoint answers non-success or no
    /// location matches the digest.
    async fn get_appx_url(
        &self,
        update_id: &str,
        revision_number: &str,
        ring: &str,
        digest: &str,
        template: &str,
        token: &CancellationToken,
    ) -> Result<String, QueryError> {
        let body = render_template(
            template,
            &[
                ("updateID", update_id),
                ("revisionNumber", revision_number),
                ("ring", ring),
            ],
        )?;
        let endpoint = self.endpoints.wu_secured.clone();
        let response = self.post_soap("appx-url", &endpoint, body, token).await?;
        if response.is_empty() {
            return Ok(String::new());
        }

        let doc = Document::parse(&response)
            .map_err(|err| QueryError::parse("appx-url", err.to_string()))?;
        Ok(find_url_by_digest(&doc, digest))
    }
}

/// Scans every `File` element into a map keyed case-insensitively by
/// `InstallerSpecificIdentifier`. The dataset repeats identifiers across
/// channel/edition variants; the first occurrence wins.
fn collect_file_descriptors(doc: &Document<'_>) -> HashMap<String, FileDescriptor> {
    let mut descriptors: HashMap<String, FileDescriptor> = HashMap::new();

    for node in elements_named(doc, "File") {
        let Some(installer_id) = attr_named(node, "InstallerSpecificIdentifier") else {
            continue;
        };
        if installer_id.is_empty() {
            continue;
        }

        let file_name = attr_named(node, "FileName").unwrap_or_default();
        let extension = file_name
            .rfind('.')
            .map(|dot| file_name[dot..].to_string())
            .unwrap_or_default();
        let size_text = attr_named(node, "Size").unwrap_or("0");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let size_bytes = size_text.parse::<f64>().unwrap_or(0.0).max(0.0) as u64;
        let digest = attr_named(node, "Digest").unwrap_or_default().to_string();

        let key = installer_id.to_lowercase();
        if !descriptors.contains_key(&key) {
            descriptors.insert(
                key,
                FileDescriptor {
                    extension,
                    size_bytes,
                    digest,
                },
            );
        }
    }
    descriptors
}

/// Correlates every `SecuredFragment` with its package block and file
/// descriptor, producing the jobs for URL resolution.
///
/// The descriptor map is keyed by `InstallerSpecificIdentifier` but probed
/// with `PackageMoniker`; upstream data keeps these identifier spaces equal,
/// and the lookup deliberately preserves that observed behavior.
fn collect_appx_jobs(
    doc: &Document<'_>,
    descriptors: &HashMap<String, FileDescriptor>,
) -> Vec<AppxJob> {
    // Index pass: tag every element that transitively contains each kind of
    // descendant. A package block is an element tagged by both.
    let mut has_appx_metadata = HashSet::new();
    let mut has_update_identity = HashSet::new();
    for node in doc.root().descendants().filter(Node::is_element) {
        match node.tag_name().name() {
            "AppxMetadata" => mark_ancestors(node, &mut has_appx_metadata),
            "UpdateIdentity" => mark_ancestors(node, &mut has_update_identity),
            _ => {}
        }
    }

    let mut jobs = Vec::new();
    for fragment in elements_named(doc, "SecuredFragment") {
        let Some(block) = fragment.ancestors().skip(1).find(|ancestor| {
            ancestor.is_element()
                && has_appx_metadata.contains(&ancestor.id())
                && has_update_identity.contains(&ancestor.id())
        }) else {
            continue;
        };

        let moniker = descendant_named(block, "AppxMetadata")
            .and_then(|meta| attr_named(meta, "PackageMoniker"))
            .unwrap_or_default();
        if moniker.is_empty() {
            continue;
        }
        let Some(descriptor) = descriptors.get(&moniker.to_lowercase()) else {
            continue;
        };

        let Some(identity) = descendant_named(block, "UpdateIdentity") else {
            continue;
        };
        let update_id = attr_named(identity, "UpdateID").unwrap_or_default();
        let revision_number = attr_named(identity, "RevisionNumber").unwrap_or_default();
        if update_id.is_empty() || revision_number.is_empty() {
            continue;
        }

        jobs.push(AppxJob {
            moniker: moniker.to_string(),
            extension: descriptor.extension.clone(),
            size_bytes: descriptor.size_bytes,
            digest: descriptor.digest.clone(),
            update_id: update_id.to_string(),
            revision_number: revision_number.to_string(),
        });
    }
    jobs
}

/// Selects the first `FileLocation` whose `FileDigest` text equals `digest`
/// case-insensitively and returns its `Url` text, or empty when none match.
fn find_url_by_digest(doc: &Document<'_>, digest: &str) -> String {
    for location in elements_named(doc, "FileLocation") {
        let location_digest = descendant_named(location, "FileDigest")
            .and_then(|node| node.text())
            .unwrap_or_default();
        if location_digest.eq_ignore_ascii_case(digest) {
            let url = descendant_named(location, "Url")
                .and_then(|node| node.text())
                .unwrap_or_default();
            if !url.is_empty() {
                return url.to_string();
            }
        }
    }
    String::new()
}

fn elements_named<'a, 'input>(
    doc: &'a Document<'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.root()
        .descendants()
        .filter(move |node| node.is_element() && node.tag_name().name() == name)
}

/// Inserts every proper ancestor of `node` into `set`.
fn mark_ancestors(node: Node<'_, '_>, set: &mut HashSet<roxmltree::NodeId>) {
    for ancestor in node.ancestors().skip(1) {
        set.insert(ancestor.id());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FILE_LIST: &str = r#"
        <Updates>
            <FileLocations>
                <File InstallerSpecificIdentifier="App.Pkg_1.0_x64" FileName="App.Pkg.appx"
                      Size="1572864" Digest="AAA="/>
                <File InstallerSpecificIdentifier="app.pkg_1.0_x64" FileName="App.Pkg.msix"
                      Size="999" Digest="BBB="/>
            </FileLocations>
            <Update>
                <Xml>
                    <Properties>
                        <SecuredFragment/>
                    </Properties>
                    <ExtendedProperties>
                        <AppxMetadata PackageMoniker="App.Pkg_1.0_x64"/>
                    </ExtendedProperties>
                    <UpdateIdentity UpdateID="uid-1" RevisionNumber="7"/>
                </Xml>
            </Update>
        </Updates>"#;

    fn jobs_for(xml: &str) -> Vec<AppxJob> {
        let doc = Document::parse(xml).unwrap();
        let descriptors = collect_file_descriptors(&doc);
        collect_appx_jobs(&doc, &descriptors)
    }

    #[test]
    fn test_first_file_descriptor_wins_case_insensitively() {
        let doc = Document::parse(FILE_LIST).unwrap();
        let descriptors = collect_file_descriptors(&doc);
        assert_eq!(descriptors.len(), 1, "duplicate key must be ignored");
        let descriptor = &descriptors["app.pkg_1.0_x64"];
        assert_eq!(descriptor.size_bytes, 1_572_864);
        assert_eq!(descriptor.extension, ".appx");
        assert_eq!(descriptor.digest, "AAA=");
    }

    #[test]
    fn test_fragment_correlates_through_shared_ancestor() {
        let jobs = jobs_for(FILE_LIST);
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.moniker, "App.Pkg_1.0_x64");
        assert_eq!(job.update_id, "uid-1");
        assert_eq!(job.revision_number, "7");
        assert_eq!(job.digest, "AAA=");
        assert_eq!(job.extension, ".appx");
    }

    #[test]
    fn test_nearest_tagged_ancestor_is_selected() {
        // Both <Inner> and <Outer> contain the required descendants; the
        // fragment must bind to <Inner>, whose identity differs.
        let xml = r#"
            <Outer>
                <AppxMetadata PackageMoniker="outer"/>
                <UpdateIdentity UpdateID="outer-uid" RevisionNumber="1"/>
                <Inner>
                    <AppxMetadata PackageMoniker="inner"/>
                    <UpdateIdentity UpdateID="inner-uid" RevisionNumber="2"/>
                    <SecuredFragment/>
                </Inner>
            </Outer>"#;
        let doc = Document::parse(xml).unwrap();
        let descriptors = HashMap::from([(
            "inner".to_string(),
            FileDescriptor {
                extension: ".appx".to_string(),
                size_bytes: 1,
                digest: "d".to_string(),
            },
        )]);
        let jobs = collect_appx_jobs(&doc, &descriptors);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].update_id, "inner-uid");
    }

    #[test]
    fn test_fragment_without_qualifying_ancestor_is_skipped() {
        let xml = r#"
            <Updates>
                <Update>
                    <AppxMetadata PackageMoniker="m"/>
                    <SecuredFragment/>
                </Update>
            </Updates>"#;
        assert!(jobs_for(xml).is_empty(), "no UpdateIdentity means no block");
    }

    #[test]
    fn test_missing_identity_attributes_skip_fragment() {
        let xml = r#"
            <Update>
                <File InstallerSpecificIdentifier="m" FileName="a.appx" Size="1" Digest="d"/>
                <AppxMetadata PackageMoniker="m"/>
                <UpdateIdentity UpdateID="" RevisionNumber="3"/>
                <SecuredFragment/>
            </Update>"#;
        assert!(jobs_for(xml).is_empty());
    }

    /// Documents the preserved identifier-space assumption: the descriptor
    /// map is keyed by `InstallerSpecificIdentifier` but probed with
    /// `PackageMoniker`, so a moniker with no identically-named descriptor
    /// finds no match and the fragment yields nothing.
    #[test]
    fn test_no_item_when_moniker_differs_from_installer_id() {
        let xml = r#"
            <Update>
                <File InstallerSpecificIdentifier="installer-id" FileName="a.appx"
                      Size="1" Digest="d"/>
                <AppxMetadata PackageMoniker="different-moniker"/>
                <UpdateIdentity UpdateID="u" RevisionNumber="1"/>
                <SecuredFragment/>
            </Update>"#;
        assert!(jobs_for(xml).is_empty());
    }

    #[test]
    fn test_unparsable_size_counts_as_zero() {
        let xml = r#"
            <Update>
                <File InstallerSpecificIdentifier="m" FileName="a.appx"
                      Size="not-a-number" Digest="d"/>
            </Update>"#;
        let doc = Document::parse(xml).unwrap();
        let descriptors = collect_file_descriptors(&doc);
        assert_eq!(descriptors["m"].size_bytes, 0);
    }

    #[test]
    fn test_fractional_size_text_is_tolerated() {
        let xml = r#"
            <Update>
                <File InstallerSpecificIdentifier="m" FileName="a.appx"
                      Size="1024.7" Digest="d"/>
            </Update>"#;
        let doc = Document::parse(xml).unwrap();
        let descriptors = collect_file_descriptors(&doc);
        assert_eq!(descriptors["m"].size_bytes, 1024);
    }

    #[test]
    fn test_digest_match_is_case_insensitive() {
        let xml = r#"
            <Envelope>
                <FileLocation>
                    <FileDigest>abc=</FileDigest>
                    <Url>https://example.com/wrong.appx</Url>
                </FileLocation>
                <FileLocation>
                    <FileDigest>DEF=</FileDigest>
                    <Url>https://example.com/right.appx</Url>
                </FileLocation>
            </Envelope>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(find_url_by_digest(&doc, "def="), "https://example.com/right.appx");
        assert_eq!(find_url_by_digest(&doc, "missing"), "");
    }
}
