//! Server-rendered pages.

use crate::domain::{
    history::SavedTrack,
    profile::{TimeRange, UserProfile},
    track::{Artist, Track},
};

/// Entries shown per time range on the top pages.
pub const TOP_PER_RANGE: u32 = 5;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn range_title(range: TimeRange) -> &'static str {
    match range {
        TimeRange::Short => "Last 4 weeks",
        TimeRange::Medium => "Last 6 months",
        TimeRange::Long => "All time",
    }
}

pub fn profile_page(profile: &UserProfile) -> String {
    let unknown = || "-".to_string();
    include_str!("../../html/profile.html")
        .replace("{{NAME}}", &escape(profile.name()))
        .replace("{{USER_ID}}", &escape(&profile.id))
        .replace(
            "{{EMAIL}}",
            &profile.email.as_deref().map(escape).unwrap_or_else(unknown),
        )
        .replace(
            "{{COUNTRY}}",
            &profile.country.as_deref().map(escape).unwrap_or_else(unknown),
        )
        .replace(
            "{{PRODUCT}}",
            &profile.product.as_deref().map(escape).unwrap_or_else(unknown),
        )
        .replace("{{FOLLOWERS}}", &profile.followers.to_string())
}

fn list_page(title: &str, sections: &[(String, Vec<String>)]) -> String {
    let sections = sections
        .iter()
        .map(|(heading, entries)| {
            let list = if entries.is_empty() {
                "    <p class=\"meta\">Nothing here yet.</p>".to_string()
            } else {
                let entries = entries
                    .iter()
                    .map(|entry| format!("      <li>{entry}</li>"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("    <ol>\n{entries}\n    </ol>")
            };
            format!(
                "  <section>\n    <h2>{}</h2>\n{list}\n  </section>",
                escape(heading)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    include_str!("../../html/list.html")
        .replace("{{TITLE}}", &escape(title))
        .replace("{{SECTIONS}}", &sections)
}

fn top_page<T>(title: &str, sections: &[(TimeRange, Vec<T>)], item: impl Fn(&T) -> String) -> String {
    let sections = sections
        .iter()
        .map(|(range, items)| (range_title(*range).to_string(), items.iter().map(&item).collect()))
        .collect::<Vec<_>>();
    list_page(title, &sections)
}

fn track_entry(track: &Track) -> String {
    format!(
        "{} <span class=\"meta\">{} &middot; {}</span>",
        escape(&track.name),
        escape(&track.artist_names().join(", ")),
        track.duration_formatted()
    )
}

pub fn top_tracks_page(sections: &[(TimeRange, Vec<Track>)]) -> String {
    top_page("Top tracks", sections, track_entry)
}

pub fn top_artists_page(sections: &[(TimeRange, Vec<Artist>)]) -> String {
    top_page("Top artists", sections, |artist| {
        let genres = if artist.genres.is_empty() {
            String::new()
        } else {
            format!(" <span class=\"meta\">{}</span>", escape(&artist.genres.join(", ")))
        };
        let image = artist
            .main_image_url()
            .map(|url| format!("<img class=\"thumb\" src=\"{}\" alt=\"\"> ", escape(url)))
            .unwrap_or_default();
        format!("{image}{}{genres}", escape(&artist.name))
    })
}

/// Stored saved tracks of a user, newest first. Entries whose track
/// document is missing show the bare id.
pub fn saved_tracks_page(profile: &UserProfile, entries: &[(SavedTrack, Option<Track>)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(saved, track)| {
            let title = match track {
                Some(track) => track_entry(track),
                None => escape(&saved.track_id),
            };
            format!(
                "{title} <span class=\"meta\">saved {}</span>",
                saved.added_at.format("%Y-%m-%d")
            )
        })
        .collect();
    list_page(
        "Saved tracks",
        &[(format!("Library of {}", profile.name()), items)],
    )
}
