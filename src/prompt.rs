//! Prompt label derived from the selected tab's URL

use url::Url;

/// Host name if the URL has one, otherwise the last path segment.
pub fn prompt_for(tab_url: &str) -> String {
    format!("{}> ", label_for(tab_url))
}

fn label_for(tab_url: &str) -> String {
    let Ok(parsed) = Url::parse(tab_url) else {
        return last_segment(tab_url).unwrap_or(tab_url).to_string();
    };

    if let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    last_segment(parsed.path())
        .unwrap_or(tab_url)
        .to_string()
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').find(|s| !s.is_empty())
}
