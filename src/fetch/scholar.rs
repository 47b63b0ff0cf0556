//! Google Scholar profile fetcher.
//!
//! Google Scholar has no official API. This collaborator scrapes the public
//! profile page, which may violate the service's Terms of Service — use at
//! your own risk. It keeps one request in flight at a time, rotates browser
//! user agents, and reports anti-bot responses as
//! [`FetchError::Challenge`] so the crawl controller can abort the run.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use crate::models::{AuthorRecord, CoauthorRecord, PublicationRecord};
use crate::session::{SessionCookie, SessionStore};

use super::{looks_like_block, AuthorFetcher, FetchError};

const SCHOLAR_URL: &str = "https://scholar.google.com";

/// Realistic browser user agents, rotated between identities.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Pause between per-publication detail fetches.
const FILL_PACE: Duration = Duration::from_secs(2);

/// Reqwest-backed fetch collaborator for Google Scholar profiles.
#[derive(Debug)]
pub struct ScholarFetcher {
    client: reqwest::Client,
    base_url: String,
    ua_index: AtomicUsize,
    extra_headers: Mutex<Vec<(String, String)>>,
    cookies: Mutex<Vec<SessionCookie>>,
    fill_pace: Duration,
}

impl ScholarFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(SCHOLAR_URL)
    }

    /// Point the fetcher at a different host. Used by tests.
    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ua_index: AtomicUsize::new(0),
            extra_headers: Mutex::new(default_headers()),
            cookies: Mutex::new(Vec::new()),
            fill_pace: FILL_PACE,
        })
    }

    fn user_agent(&self) -> &'static str {
        USER_AGENTS[self.ua_index.load(Ordering::Relaxed) % USER_AGENTS.len()]
    }

    fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.lock().unwrap();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    async fn get_page(&self, url: &str) -> Result<(reqwest::StatusCode, String, String), FetchError> {
        let mut request = self.client.get(url).header("User-Agent", self.user_agent());

        for (name, value) in self.extra_headers.lock().unwrap().iter() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = self.cookie_header() {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((status, final_url, body))
    }

    /// Fetch one page and classify anti-bot responses.
    async fn get_checked(&self, url: &str) -> Result<String, FetchError> {
        let (status, final_url, body) = self.get_page(url).await?;

        if is_block_response(status, &final_url, &body) {
            return Err(FetchError::Challenge(format!(
                "anti-bot response for {} (status {}, final url {})",
                url, status, final_url
            )));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Api(format!("HTTP {} for {}", status, url)));
        }
        Ok(body)
    }

    fn profile_url(&self, scholar_id: &str) -> String {
        format!(
            "{}/citations?hl=en&user={}&cstart=0&pagesize=100",
            self.base_url,
            urlencoding::encode(scholar_id)
        )
    }

    fn citation_url(&self, author_pub_id: &str) -> String {
        format!(
            "{}/citations?view_op=view_citation&hl=en&citation_for_view={}",
            self.base_url,
            urlencoding::encode(author_pub_id)
        )
    }

    /// Whether a list-level entry still needs the expensive detail fetch.
    fn needs_fill(publication: &PublicationRecord) -> bool {
        publication.author.is_none()
            || publication.journal.is_none() && publication.venue.is_none()
            || publication.pub_url.is_none()
    }
}

#[async_trait]
impl AuthorFetcher for ScholarFetcher {
    async fn fetch_author(
        &self,
        scholar_id: &str,
        skip_pub_ids: &HashSet<String>,
    ) -> Result<AuthorRecord, FetchError> {
        let body = self.get_checked(&self.profile_url(scholar_id)).await?;
        let mut author = parse_profile(&body, scholar_id)?;

        let mut filled = 0usize;
        for publication in &mut author.publications {
            if !publication.has_pub_id() || skip_pub_ids.contains(&publication.author_pub_id) {
                continue;
            }
            if !Self::needs_fill(publication) {
                continue;
            }

            if filled > 0 {
                sleep(self.fill_pace).await;
            }
            filled += 1;

            let url = self.citation_url(&publication.author_pub_id);
            match self.get_checked(&url).await {
                Ok(detail_body) => {
                    apply_citation_view(publication, &detail_body);
                }
                // A challenge mid-fill aborts the run like any other block.
                Err(err @ FetchError::Challenge(_)) => return Err(err),
                Err(err) => {
                    // Merge logic preserves existing data; a failed fill only
                    // costs detail for this sighting.
                    tracing::warn!(author_pub_id = %publication.author_pub_id, %err, "detail fetch failed");
                }
            }
        }

        tracing::debug!(
            scholar_id,
            publications = author.publications.len(),
            filled,
            skipped = skip_pub_ids.len(),
            "fetched author profile"
        );
        Ok(author)
    }

    async fn rotate_identity(&self) {
        let next = self.ua_index.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(user_agent = USER_AGENTS[next % USER_AGENTS.len()], "rotated outbound identity");
    }
}

#[async_trait]
impl SessionStore for ScholarFetcher {
    fn set_headers(&self, headers: Vec<(String, String)>) {
        *self.extra_headers.lock().unwrap() = headers;
    }

    fn inject_cookies(&self, cookies: &[SessionCookie]) {
        let mut guard = self.cookies.lock().unwrap();
        *guard = cookies.to_vec();
        tracing::info!(cookies = guard.len(), "injected session cookies");
    }

    async fn validate(&self) -> Result<bool, FetchError> {
        let url = format!("{}/", self.base_url);
        let (status, final_url, body) = self.get_page(&url).await?;
        Ok(!is_block_response(status, &final_url, &body))
    }
}

fn default_headers() -> Vec<(String, String)> {
    vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("DNT".to_string(), "1".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Referer".to_string(), "https://scholar.google.com/".to_string()),
    ]
}

/// Content heuristics for an anti-automation response: rate-limit status, a
/// redirect onto the interstitial, or challenge phrases in the body.
fn is_block_response(status: reqwest::StatusCode, final_url: &str, body: &str) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || final_url.contains("/sorry")
        || looks_like_block(body)
}

fn sel(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector)
        .map_err(|e| FetchError::Parse(format!("bad selector {}: {}", selector, e)))
}

fn text_of(html: &Html, selector: &Selector) -> Option<String> {
    html.select(selector).next().map(|el| {
        el.text().collect::<String>().trim().to_string()
    })
}

/// Parse the author profile page into a record. Pure; tested on fixtures.
fn parse_profile(body: &str, scholar_id: &str) -> Result<AuthorRecord, FetchError> {
    let html = Html::parse_document(body);

    let name_sel = sel("#gsc_prf_in")?;
    let affil_sel = sel(".gsc_prf_il")?;
    let homepage_sel = sel("#gsc_prf_ivh a")?;
    let interests_sel = sel("#gsc_prf_int a")?;
    let citedby_sel = sel("td.gsc_rsb_std")?;
    let year_sel = sel(".gsc_g_t")?;
    let count_sel = sel(".gsc_g_al")?;
    let row_sel = sel("tr.gsc_a_tr")?;

    let name = text_of(&html, &name_sel);
    if name.is_none() {
        return Err(FetchError::Parse(format!(
            "profile page for {} has no author name",
            scholar_id
        )));
    }

    let mut author = AuthorRecord::new(scholar_id);
    author.name = name;
    author.affiliation = text_of(&html, &affil_sel).filter(|s| !s.is_empty());
    author.homepage = html
        .select(&homepage_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string);
    author.interests = html
        .select(&interests_sel)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    author.citedby = html
        .select(&citedby_sel)
        .next()
        .and_then(|td| td.text().collect::<String>().trim().parse().ok());

    // The affiliation line links to the institution's own Scholar page; the
    // numeric org id lives in that link's query string.
    let org_sel = sel(".gsc_prf_il a")?;
    author.organization = html
        .select(&org_sel)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| query_param(href, "org"))
        .and_then(|id| id.parse().ok());

    let coauthor_sel = sel(".gsc_rsb_a .gsc_rsb_a_desc")?;
    let coauthor_link_sel = sel("a")?;
    let coauthor_ext_sel = sel(".gsc_rsb_a_ext")?;
    for entry in html.select(&coauthor_sel) {
        let Some(link) = entry.select(&coauthor_link_sel).next() else {
            continue;
        };
        // Sidebar entries without a profile link carry no stable identity.
        let Some(id) = link
            .value()
            .attr("href")
            .and_then(|href| query_param(href, "user"))
        else {
            continue;
        };

        author.coauthors.push(CoauthorRecord {
            scholar_id: id,
            name: Some(link.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty()),
            affiliation: entry
                .select(&coauthor_ext_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }

    let years: Vec<i32> = html
        .select(&year_sel)
        .filter_map(|el| el.text().collect::<String>().trim().parse().ok())
        .collect();
    let counts: Vec<u64> = html
        .select(&count_sel)
        .filter_map(|el| el.text().collect::<String>().trim().parse().ok())
        .collect();
    author.cites_per_year = years.into_iter().zip(counts).collect();

    let title_sel = sel("a.gsc_a_at")?;
    let gray_sel = sel(".gs_gray")?;
    let cited_sel = sel("a.gsc_a_ac")?;
    let year_cell_sel = sel("td.gsc_a_y span")?;

    for row in html.select(&row_sel) {
        let mut publication = PublicationRecord::default();

        if let Some(link) = row.select(&title_sel).next() {
            let title = link.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                publication.title = Some(title);
            }
            if let Some(href) = link.value().attr("href") {
                if let Some(id) = query_param(href, "citation_for_view") {
                    publication.author_pub_id = id;
                }
            }
        }

        let mut gray = row.select(&gray_sel);
        if let Some(authors) = gray.next() {
            let text = authors.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                publication.author = Some(text);
            }
        }
        if let Some(venue) = gray.next() {
            let text = venue.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                publication.citation = Some(text);
            }
        }

        publication.num_citations = row
            .select(&cited_sel)
            .next()
            .and_then(|a| a.text().collect::<String>().trim().parse().ok());
        publication.pub_year = row
            .select(&year_cell_sel)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        if publication.title.is_some() || publication.has_pub_id() {
            author.publications.push(publication);
        }
    }

    Ok(author)
}

/// Overlay fields from a `view_citation` detail page onto a list-level entry.
/// Parse problems are tolerated; the entry just stays sparse.
fn apply_citation_view(publication: &mut PublicationRecord, body: &str) {
    let html = Html::parse_document(body);

    let (Ok(field_sel), Ok(title_sel), Ok(descr_sel)) = (
        sel(".gs_scl"),
        sel("#gsc_oci_title a"),
        sel("#gsc_oci_descr"),
    ) else {
        return;
    };
    let (Ok(label_sel), Ok(value_sel)) = (sel(".gsc_oci_field"), sel(".gsc_oci_value")) else {
        return;
    };

    if publication.pub_url.is_none() {
        publication.pub_url = html
            .select(&title_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
    }
    if publication.r#abstract.is_none() {
        publication.r#abstract = html
            .select(&descr_sel)
            .next()
            .map(|d| d.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());
    }

    for section in html.select(&field_sel) {
        let Some(label) = section.select(&label_sel).next() else { continue };
        let Some(value) = section.select(&value_sel).next() else { continue };
        let label = label.text().collect::<String>().trim().to_lowercase();
        let value = value.text().collect::<String>().trim().to_string();
        if value.is_empty() {
            continue;
        }

        match label.as_str() {
            "authors" => publication.author = Some(value),
            "journal" => publication.journal = Some(value),
            "conference" | "source" => publication.venue = Some(value),
            "volume" => publication.volume = Some(value),
            "issue" => publication.number = Some(value),
            "pages" => publication.pages = Some(value),
            "publisher" => publication.publisher = Some(value),
            "publication date" => {
                if publication.pub_year.is_none() {
                    publication.pub_year = value.split('/').next().map(str::to_string);
                }
            }
            _ => {}
        }
    }
}

fn query_param(href: &str, name: &str) -> Option<String> {
    let query = href.split_once('?').map(|(_, q)| q).unwrap_or(href);
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name && !value.is_empty() {
                return urlencoding::decode(value).ok().map(|v| v.into_owned());
            }
        }
    }
    None
}
