//! Technology signature tables

use regex::{Regex, RegexBuilder};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::{BTreeMap, BTreeSet};

/// Detected technologies grouped by category
pub type TechProfile = BTreeMap<String, BTreeSet<String>>;

/// (category, header, pattern, technology)
const HEADER_SIGNATURES: &[(&str, &str, &str, &str)] = &[
    ("web_server", "server", "nginx", "Nginx"),
    ("web_server", "server", "apache", "Apache"),
    ("web_server", "server", "IIS", "Microsoft IIS"),
    ("web_server", "server", "cloudflare", "Cloudflare"),
    ("web_server", "server", "gunicorn", "Gunicorn"),
    ("web_server", "server", "uwsgi", "uWSGI"),
    ("frameworks", "x-powered-by", "PHP", "PHP"),
    ("frameworks", "x-powered-by", r"ASP\.NET", "ASP.NET"),
    ("frameworks", "x-powered-by", "Express", "Express.js"),
    ("frameworks", "x-powered-by", "Django", "Django"),
    ("frameworks", "x-powered-by", "Rails", "Ruby on Rails"),
    ("frameworks", "x-framework", ".*", "Custom Framework"),
    ("cms", "x-generator", "WordPress", "WordPress"),
    ("cms", "x-generator", "Drupal", "Drupal"),
    ("cms", "x-generator", "Joomla", "Joomla"),
    ("cdn", "server", "cloudflare", "Cloudflare"),
    ("cdn", "server", "AmazonS3", "Amazon S3"),
    ("cdn", "x-cdn", ".*", "CDN Detected"),
    ("security", "x-xss-protection", ".*", "XSS Protection"),
    ("security", "x-content-type-options", ".*", "Content Type Options"),
    ("security", "strict-transport-security", ".*", "HSTS"),
];

/// (category, pattern, technology)
const CONTENT_SIGNATURES: &[(&str, &str, &str)] = &[
    ("frameworks", r#"<meta name="generator" content="WordPress"#, "WordPress"),
    ("frameworks", r#"<meta name="generator" content="Drupal"#, "Drupal"),
    ("frameworks", "wp-content/", "WordPress"),
    ("frameworks", "wp-includes/", "WordPress"),
    ("frameworks", "/sites/default/files/", "Drupal"),
    ("frameworks", "joomla", "Joomla"),
    ("frameworks", "django", "Django"),
    ("frameworks", "flask", "Flask"),
    ("frameworks", "laravel", "Laravel"),
    ("frameworks", "symfony", "Symfony"),
    ("programming_languages", r"\.php", "PHP"),
    ("programming_languages", r"\.asp", "ASP"),
    ("programming_languages", r"\.aspx", "ASP.NET"),
    ("programming_languages", r"\.jsp", "JSP"),
    ("analytics", "google-analytics", "Google Analytics"),
    ("analytics", "gtag", "Google Tag Manager"),
    ("analytics", "mixpanel", "Mixpanel"),
    ("analytics", "hotjar", "Hotjar"),
    ("other", "jquery", "jQuery"),
    ("other", "bootstrap", "Bootstrap"),
    ("other", "react", "React"),
    ("other", "angular", "Angular"),
    ("other", "vue", "Vue.js"),
];

/// (category, cookie-name fragment, technology)
const COOKIE_SIGNATURES: &[(&str, &str, &str)] = &[
    ("frameworks", "phpsessid", "PHP"),
    ("frameworks", "asp.net_sessionid", "ASP.NET"),
    ("frameworks", "jsessionid", "Java"),
    ("frameworks", "django_session", "Django"),
    ("frameworks", "flask_session", "Flask"),
    ("cms", "wordpress_", "WordPress"),
    ("cms", "wp-", "WordPress"),
    ("cms", "sess", "Drupal"),
];

/// (category, token) looked for verbatim in whatweb output
const WHATWEB_SIGNATURES: &[(&str, &str)] = &[
    ("web_server", "Apache"),
    ("web_server", "Nginx"),
    ("web_server", "IIS"),
    ("web_server", "Lighttpd"),
    ("frameworks", "PHP"),
    ("frameworks", "ASP.NET"),
    ("frameworks", "Django"),
    ("frameworks", "Rails"),
    ("frameworks", "Express"),
    ("cms", "WordPress"),
    ("cms", "Drupal"),
    ("cms", "Joomla"),
    ("cms", "Magento"),
    ("programming_languages", "PHP"),
    ("programming_languages", "Python"),
    ("programming_languages", "Ruby"),
    ("programming_languages", "Java"),
    ("other", "jQuery"),
    ("other", "Bootstrap"),
    ("other", "AngularJS"),
    ("other", "React"),
];

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap()
}

lazy_static::lazy_static! {
    static ref HEADER_PATTERNS: Vec<(&'static str, &'static str, Regex, &'static str)> =
        HEADER_SIGNATURES
            .iter()
            .map(|(category, header, pattern, name)| (*category, *header, case_insensitive(pattern), *name))
            .collect();
    static ref CONTENT_PATTERNS: Vec<(&'static str, Regex, &'static str)> = CONTENT_SIGNATURES
        .iter()
        .map(|(category, pattern, name)| (*category, case_insensitive(pattern), *name))
        .collect();
}

fn add(profile: &mut TechProfile, category: &str, name: &str) {
    profile
        .entry(category.to_string())
        .or_default()
        .insert(name.to_string());
}

pub fn analyze_headers(headers: &HeaderMap, profile: &mut TechProfile) {
    for (category, header, pattern, name) in HEADER_PATTERNS.iter() {
        let matched = headers
            .get_all(*header)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| pattern.is_match(value));
        if matched {
            add(profile, category, name);
        }
    }
}

pub fn analyze_content(body: &str, profile: &mut TechProfile) {
    for (category, pattern, name) in CONTENT_PATTERNS.iter() {
        if pattern.is_match(body) {
            add(profile, category, name);
        }
    }
}

/// Cookie names from every `Set-Cookie` header
pub fn cookie_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split('=').next())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn analyze_cookies<S: AsRef<str>>(names: &[S], profile: &mut TechProfile) {
    for (category, fragment, name) in COOKIE_SIGNATURES {
        if names
            .iter()
            .any(|cookie| cookie.as_ref().to_ascii_lowercase().contains(fragment))
        {
            add(profile, category, name);
        }
    }
}

pub fn merge_whatweb(output: &str, profile: &mut TechProfile) {
    for (category, token) in WHATWEB_SIGNATURES {
        if output.contains(token) {
            add(profile, category, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_header_signatures() {
        let mut headers = HeaderMap::new();
        headers.insert("Server", HeaderValue::from_static("cloudflare"));
        headers.insert("X-Powered-By", HeaderValue::from_static("PHP/8.2"));
        headers.insert("Strict-Transport-Security", HeaderValue::from_static("max-age=1"));

        let mut profile = TechProfile::new();
        analyze_headers(&headers, &mut profile);
        assert!(profile["web_server"].contains("Cloudflare"));
        assert!(profile["cdn"].contains("Cloudflare"));
        assert!(profile["frameworks"].contains("PHP"));
        assert!(profile["security"].contains("HSTS"));
        assert!(!profile.contains_key("cms"));
    }

    #[test]
    fn test_cookie_signatures() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("PHPSESSID=abc; path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("wordpress_logged_in=1"));
        let names = cookie_names(&headers);
        assert_eq!(names, vec!["PHPSESSID", "wordpress_logged_in"]);

        let mut profile = TechProfile::new();
        analyze_cookies(&names, &mut profile);
        assert!(profile["frameworks"].contains("PHP"));
        assert!(profile["cms"].contains("WordPress"));
    }

    #[test]
    fn test_content_and_whatweb() {
        let mut profile = TechProfile::new();
        analyze_content(
            r#"<link href="/wp-content/themes/x.css"><script src="jquery.min.js"></script>"#,
            &mut profile,
        );
        merge_whatweb(
            "http://example.com [200 OK] Apache[2.4.57], Country[US], PHP[8.1]",
            &mut profile,
        );
        assert!(profile["frameworks"].contains("WordPress"));
        assert!(profile["other"].contains("jQuery"));
        assert!(profile["web_server"].contains("Apache"));
        assert!(profile["programming_languages"].contains("PHP"));
    }
}
