//! Selector profiles of the sites that are crawled rather than read from a feed.

use url::Url;

use crate::rules::sites::ukrinform_rubric;

use super::selectors::LinkTiers;
use super::walker::SiteProfile;

pub static ALL: &[&SiteProfile] = &[&UKRINFORM, &ARMYINFORM, &TAX_GOV];

const PUBLISHED: &[(&str, &str)] = &[
    ("meta[property=\"article:published_time\"]", "content"),
    ("time[datetime]", "datetime"),
    (".article__date", "datetime"),
    (".news-date", "datetime"),
];

fn ukrinform_category(url: &Url) -> Option<String> {
    url.path_segments()?
        .find(|segment| segment.starts_with("rubric-"))
        .and_then(ukrinform_rubric)
        .map(str::to_string)
}

pub static UKRINFORM: SiteProfile = SiteProfile {
    domain: "ukrinform.ua",
    start_urls: &["https://www.ukrinform.ua/block-lastnews"],
    links: LinkTiers {
        primary: &[
            "div.rest a",
            "article h2 a",
            ".news-card__title a",
            ".news-list__article a",
            ".article-title a",
            "a.article-link",
        ],
        structural: &["a[href*=\"/rubric-\"]", ".news-list a", "div.block-news a"],
        path_patterns: &["/news/", "/article/", "/rubric-"],
    },
    next_page: &[],
    title: &["h1.newsTitle", "h1.article__title", "h1.news-title", "h1"],
    content: &[
        "div.newsText p",
        "div.article-text p",
        "div.article__text p",
        "div.article-body p",
        "div.content p",
        "div[itemprop=\"articleBody\"] p",
    ],
    tags: &["aside.tags a.tag", "div.article__tags a", ".tags a", "div.tags-item a"],
    keyword_tags: &[],
    published: PUBLISHED,
    map_category: ukrinform_category,
};

fn armyinform_category(_url: &Url) -> Option<String> {
    Some("news".to_string())
}

pub static ARMYINFORM: SiteProfile = SiteProfile {
    domain: "armyinform.com.ua",
    start_urls: &["https://armyinform.com.ua/category/news/"],
    links: LinkTiers {
        primary: &["div.archive-item h2.entry-title a"],
        structural: &["article h2.entry-title a", "h2.entry-title a"],
        path_patterns: &["/20"],
    },
    next_page: &["a.next.page-numbers"],
    title: &["h1.entry-title", "header h1"],
    content: &["div.single-content p", "div.single-content"],
    tags: &["div.tags-area a"],
    keyword_tags: &[],
    published: PUBLISHED,
    map_category: armyinform_category,
};

/// URL path segment to site category label; anything else is general news.
const TAX_SECTIONS: &[(&str, &str)] = &[
    ("podatki", "податки"),
    ("zakonodavstvo", "законодавство"),
    ("diyalnist", "діяльність"),
];

fn tax_category(url: &Url) -> Option<String> {
    let label = url
        .path_segments()
        .into_iter()
        .flatten()
        .find_map(|segment| {
            TAX_SECTIONS
                .iter()
                .find(|(section, _)| *section == segment)
                .map(|(_, label)| *label)
        })
        .unwrap_or("новини");
    Some(label.to_string())
}

pub static TAX_GOV: SiteProfile = SiteProfile {
    domain: "tax.gov.ua",
    start_urls: &["https://tax.gov.ua/media-tsentr/novini/"],
    links: LinkTiers {
        primary: &["div.news-list div.news-title a"],
        structural: &["div.news-list a", ".news-title a"],
        path_patterns: &["/media-tsentr/novini/"],
    },
    next_page: &["div.pager a.next"],
    title: &["h1.page-title", "h1"],
    content: &["div.news-detail-text p", "div.news-detail-text"],
    tags: &[],
    keyword_tags: &[
        "податки",
        "дпс",
        "фіскальна",
        "єдиний податок",
        "пдв",
        "декларація",
        "бізнес",
    ],
    published: PUBLISHED,
    map_category: tax_category,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn ukrinform_rubrics_map_to_labels() {
        assert_eq!(
            ukrinform_category(&url("https://www.ukrinform.ua/rubric-ato/1.html")).as_deref(),
            Some("war")
        );
        assert_eq!(ukrinform_category(&url("https://www.ukrinform.ua/rubric-other/1.html")), None);
    }

    #[test]
    fn tax_sections_default_to_news() {
        assert_eq!(
            tax_category(&url("https://tax.gov.ua/zakonodavstvo/1.html")).as_deref(),
            Some("законодавство")
        );
        assert_eq!(
            tax_category(&url("https://tax.gov.ua/media-tsentr/novini/1.html")).as_deref(),
            Some("новини")
        );
    }
}
