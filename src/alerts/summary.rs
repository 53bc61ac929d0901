//! Human-readable notification text for a flushed alert batch.

use std::collections::BTreeMap;

use super::{PendingAlert, Strategy};
use crate::config::AlertConfig;
use crate::notify::Notification;
use crate::signal::Direction;

const TITLE_CHARS: usize = 80;
const SINGLE_MAX_ETFS: usize = 4;
const TOP_ALERTS: usize = 3;

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

fn sector_label(a: &PendingAlert) -> &str {
    if a.sector.trim().is_empty() {
        "General"
    } else {
        a.sector.trim()
    }
}

/// Summary body. One alert under `Immediate` gets the single-signal layout;
/// everything else gets the aggregate layout.
pub fn compose_summary(alerts: &[PendingAlert], strategy: Strategy, cfg: &AlertConfig) -> String {
    match alerts {
        [] => String::new(),
        [a] if strategy == Strategy::Immediate => single(a),
        _ => aggregate(alerts, strategy, cfg),
    }
}

fn single(a: &PendingAlert) -> String {
    let mut etfs = a
        .etfs
        .iter()
        .take(SINGLE_MAX_ETFS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if a.etfs.len() > SINGLE_MAX_ETFS {
        etfs.push_str("...");
    }
    format!(
        "{} {} Signal ({}/10)\n\n{}\n\nReason: {}\n\nETFs: {}",
        a.direction.arrow(),
        a.direction.as_str().to_uppercase(),
        a.confidence,
        clip(&a.title, TITLE_CHARS),
        a.reasoning,
        etfs
    )
}

fn aggregate(alerts: &[PendingAlert], strategy: Strategy, cfg: &AlertConfig) -> String {
    let mut out = if strategy == Strategy::DailyDigest {
        format!("Daily Market Summary ({})\n\n", plural(alerts.len(), "signal"))
    } else {
        format!("Market Batch Update ({})\n\n", plural(alerts.len(), "signal"))
    };

    let parts: Vec<String> = [Direction::Bullish, Direction::Bearish, Direction::Neutral]
        .into_iter()
        .filter_map(|d| {
            let n = alerts.iter().filter(|a| a.direction == d).count();
            (n > 0).then(|| format!("{} {} {}", d.arrow(), n, d))
        })
        .collect();
    out.push_str(&format!("Signals: {}\n\n", parts.join(" | ")));

    let mut ranked: Vec<&PendingAlert> = alerts.iter().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let high: Vec<&PendingAlert> = ranked
        .iter()
        .copied()
        .filter(|a| a.confidence >= cfg.critical_confidence)
        .collect();
    let moderate: Vec<&PendingAlert> = ranked
        .iter()
        .copied()
        .filter(|a| a.confidence >= cfg.medium_confidence && a.confidence < cfg.critical_confidence)
        .collect();
    section(&mut out, "High confidence", &high);
    section(&mut out, "Moderate confidence", &moderate);

    let mut sectors: BTreeMap<&str, Vec<&PendingAlert>> = BTreeMap::new();
    for a in alerts {
        sectors.entry(sector_label(a)).or_default().push(a);
    }
    if sectors.len() > 1 {
        let mut by_size: Vec<(&str, Vec<&PendingAlert>)> = sectors.into_iter().collect();
        by_size.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
        out.push_str("Sectors active:\n");
        for (sector, members) in by_size {
            let mut etfs: Vec<&str> = Vec::new();
            for e in members.iter().flat_map(|a| a.etfs.iter().take(2)) {
                if !etfs.contains(&e.as_str()) {
                    etfs.push(e);
                }
            }
            etfs.truncate(3);
            out.push_str(&format!("• {sector}: {}\n", etfs.join(", ")));
        }
        out.push('\n');
    }

    let mut instruments: Vec<&str> = Vec::new();
    for e in alerts.iter().flat_map(|a| a.etfs.iter()) {
        if !instruments.contains(&e.as_str()) {
            instruments.push(e);
        }
    }
    if !instruments.is_empty() {
        out.push_str(&format!("Instruments: {}", instruments.join(", ")));
    }

    out.trim().to_string()
}

fn section(out: &mut String, heading: &str, alerts: &[&PendingAlert]) {
    if alerts.is_empty() {
        return;
    }
    out.push_str(&format!("{heading}:\n"));
    for a in alerts.iter().take(TOP_ALERTS) {
        out.push_str(&format!(
            "• {} {} ({}/10): {}\n",
            a.direction,
            sector_label(a),
            a.confidence,
            clip(&a.title, TITLE_CHARS)
        ));
    }
    if alerts.len() > TOP_ALERTS {
        out.push_str(&format!("• +{} more\n", alerts.len() - TOP_ALERTS));
    }
    out.push('\n');
}

/// Title, priority and link for a flushed batch, plus the composed body.
pub fn compose_notification(alerts: &[PendingAlert], strategy: Strategy, cfg: &AlertConfig) -> Notification {
    let critical = alerts
        .iter()
        .filter(|a| a.confidence >= cfg.critical_confidence)
        .count();
    let prefix = cfg.title_prefix.trim();
    let (title, priority) = if strategy == Strategy::DailyDigest {
        (format!("{prefix} Daily Digest"), 0)
    } else if critical > 0 {
        (format!("{prefix} HIGH ({critical} critical)"), 1)
    } else {
        (format!("{prefix} Update ({})", plural(alerts.len(), "signal")), 0)
    };

    // earliest of the highest-confidence alerts
    let best = alerts.iter().fold(None::<&PendingAlert>, |best, a| match best {
        Some(b) if b.confidence >= a.confidence => Some(b),
        _ => Some(a),
    });
    let url = best
        .map(|a| a.article_url.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    Notification {
        title,
        message: compose_summary(alerts, strategy, cfg),
        priority,
        url_title: url.as_ref().map(|_| "View Analysis".to_string()),
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn alert(conf: u8, dir: Direction, sector: &str, etfs: &[&str], url: &str) -> PendingAlert {
        PendingAlert {
            id: format!("id{conf}{sector}"),
            direction: dir,
            confidence: conf,
            title: format!("{sector} headline at {conf}"),
            reasoning: "because".into(),
            etfs: etfs.iter().map(|s| s.to_string()).collect(),
            sector: sector.into(),
            article_url: url.into(),
            search_term: String::new(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 4, 15, conf.into(), 0).unwrap(),
        }
    }

    #[test]
    fn single_immediate_layout() {
        let a = alert(8, Direction::Bearish, "CleanTech", &["TAN", "ICLN", "LIT", "URA", "QQQ"], "");
        let s = compose_summary(&[a], Strategy::Immediate, &AlertConfig::default());
        assert!(s.starts_with("↘ BEARISH Signal (8/10)"));
        assert!(s.ends_with("ETFs: TAN, ICLN, LIT, URA..."));
    }

    #[test]
    fn aggregate_groups_and_ranks() {
        let cfg = AlertConfig::default();
        let alerts = vec![
            alert(9, Direction::Bullish, "Defense", &["ITA", "XAR"], "https://n/9"),
            alert(8, Direction::Bullish, "CleanTech", &["TAN"], "https://n/8"),
            alert(7, Direction::Bearish, "CleanTech", &["ICLN", "TAN"], ""),
        ];
        let s = compose_summary(&alerts, Strategy::SmartBatch, &cfg);
        assert!(s.starts_with("Market Batch Update (3 signals)"));
        assert!(s.contains("Signals: ↗ 2 Bullish | ↘ 1 Bearish"));
        assert!(s.contains("High confidence:\n• Bullish Defense (9/10)"));
        assert!(s.contains("Moderate confidence:\n• Bullish CleanTech (8/10)"));
        assert!(s.contains("• CleanTech: TAN, ICLN\n• Defense: ITA, XAR"));
        assert!(s.ends_with("Instruments: ITA, XAR, TAN, ICLN"));

        let n = compose_notification(&alerts, Strategy::SmartBatch, &cfg);
        assert_eq!(n.title, "Signals HIGH (1 critical)");
        assert_eq!(n.priority, 1);
        assert_eq!(n.url.as_deref(), Some("https://n/9"));
        assert_eq!(n.url_title.as_deref(), Some("View Analysis"));
    }

    #[test]
    fn digest_title_and_missing_url() {
        let cfg = AlertConfig::default();
        let alerts = vec![alert(7, Direction::Neutral, "", &["QQQ"], "")];
        let n = compose_notification(&alerts, Strategy::DailyDigest, &cfg);
        assert_eq!(n.title, "Signals Daily Digest");
        assert_eq!(n.priority, 0);
        assert!(n.url.is_none() && n.url_title.is_none());
        assert!(n.message.starts_with("Daily Market Summary (1 signal)"));

        let n = compose_notification(&alerts, Strategy::TimeWindow, &cfg);
        assert_eq!(n.title, "Signals Update (1 signal)");
    }
}
