use std::sync::LazyLock;

use chrono::Datelike as _;
use chrono::Days;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::http::HttpMethod;
use framework::http::HttpRequest;
use framework::http::header;
use regex::Regex;
use serde::Deserialize;

/// Daily fund quota value export of CMF (Comisión para el Mercado Financiero).
///
/// `administrator`, `fund_type` and `currency` are the provider's filter values, "0" means no filtering.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_in_secs: u64,
    pub offset_days: u64,
    pub administrator: String,
    pub fund_type: String,
    pub currency: String,
    pub output: String,
    pub lang: String,
}

pub fn target_date(today: NaiveDate, offset_days: u64) -> CoreRsResult<NaiveDate> {
    today
        .checked_sub_days(Days::new(offset_days))
        .ok_or_else(|| exception!(message = format!("target date out of range, today={today}, offset_days={offset_days}")))
}

pub fn download_request(config: &SourceConfig, target_date: NaiveDate) -> HttpRequest {
    let mut request = HttpRequest::new(HttpMethod::GET, config.url.clone());
    request.query("admins", &config.administrator);
    request.query("tipofondo", &config.fund_type);
    request.query("moneda", &config.currency);
    request.query("dia_select", target_date.day().to_string());
    request.query("mes_peri", format!("{:02}", target_date.month()));
    request.query("anio_peri", target_date.year().to_string());
    request.query("out", &config.output);
    request.query("lang", &config.lang);
    request.headers.insert(header::USER_AGENT, config.user_agent.clone());
    request
}

/// Local and remote file name, from `Content-Disposition` if present, sanitized.
pub fn file_name(content_disposition: Option<&str>, target_date: NaiveDate) -> String {
    let file_name = content_disposition
        .and_then(disposition_file_name)
        .unwrap_or_else(|| default_file_name(target_date));
    sanitize_file_name(&file_name)
}

fn disposition_file_name(content_disposition: &str) -> Option<String> {
    static FILE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"filename="?([^"]+)"?"#).unwrap());

    FILE_NAME_REGEX
        .captures(content_disposition)
        .and_then(|captures| captures.get(1))
        .map(|file_name| file_name.as_str().to_owned())
}

fn default_file_name(target_date: NaiveDate) -> String {
    format!("datos_cmf_{}.xls", target_date.format("%Y%m%d"))
}

fn sanitize_file_name(file_name: &str) -> String {
    let mut sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !has_extension(&sanitized, "xls") && !has_extension(&sanitized, "xlsx") {
        sanitized.push_str(".xls");
    }
    sanitized
}

pub fn object_name(folder: &str, target_date: NaiveDate, uploaded_at: NaiveDateTime, file_name: &str) -> String {
    format!(
        "{folder}/{}/{}-{file_name}",
        target_date.format("%Y/%m/%d"),
        uploaded_at.format("%Y%m%d-%H%M%S")
    )
}

fn has_extension(file_name: &str, extension: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, suffix)| suffix.eq_ignore_ascii_case(extension))
}

pub fn content_type(file_name: &str) -> &'static str {
    if has_extension(file_name, "xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else {
        "application/vnd.ms-excel"
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::SourceConfig;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn config() -> SourceConfig {
        SourceConfig {
            url: "https://www.cmfchile.cl/institucional/estadisticas/fm.fm_bpr_dia.php".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
            timeout_in_secs: 180,
            offset_days: 5,
            administrator: "0".to_owned(),
            fund_type: "0".to_owned(),
            currency: "0".to_owned(),
            output: "excel".to_owned(),
            lang: "es".to_owned(),
        }
    }

    #[test]
    fn target_date() {
        assert_eq!(super::target_date(date(2024, 3, 10), 5).unwrap(), date(2024, 3, 5));
        assert_eq!(super::target_date(date(2024, 3, 3), 5).unwrap(), date(2024, 2, 27));
        assert_eq!(super::target_date(date(2025, 1, 2), 5).unwrap(), date(2024, 12, 28));
        assert!(super::target_date(NaiveDate::MIN, 5).is_err());
    }

    #[test]
    fn download_request() {
        let request = super::download_request(&config(), date(2024, 3, 5));

        assert_eq!(
            request.full_url().unwrap().as_str(),
            "https://www.cmfchile.cl/institucional/estadisticas/fm.fm_bpr_dia.php?admins=0&tipofondo=0&moneda=0&dia_select=5&mes_peri=03&anio_peri=2024&out=excel&lang=es"
        );
        assert_eq!(
            request.headers.get(&framework::http::header::USER_AGENT).map(String::as_str),
            Some("Mozilla/5.0")
        );
    }

    #[test]
    fn download_request_with_two_digit_day() {
        let request = super::download_request(&config(), date(2023, 11, 28));

        let url = request.full_url().unwrap();
        assert!(url.as_str().contains("dia_select=28&mes_peri=11&anio_peri=2023"));
    }

    #[test]
    fn disposition_file_name() {
        assert_eq!(
            super::disposition_file_name(r#"attachment; filename="report.xls""#).as_deref(),
            Some("report.xls")
        );
        assert_eq!(
            super::disposition_file_name("attachment; filename=report.xls").as_deref(),
            Some("report.xls")
        );
        assert_eq!(super::disposition_file_name("attachment").as_deref(), None);
        assert_eq!(super::disposition_file_name(r#"attachment; filename="""#).as_deref(), None);
    }

    #[test]
    fn file_name() {
        let target_date = date(2024, 3, 5);

        assert_eq!(
            super::file_name(Some(r#"attachment; filename="report.xls""#), target_date),
            "report.xls"
        );
        assert_eq!(super::file_name(None, target_date), "datos_cmf_20240305.xls");
        assert_eq!(super::file_name(Some("inline"), target_date), "datos_cmf_20240305.xls");
    }

    #[test]
    fn sanitize_file_name() {
        assert_eq!(super::sanitize_file_name("valores cuota.xls"), "valores_cuota.xls");
        assert_eq!(super::sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd.xls");
        assert_eq!(super::sanitize_file_name("año-2024.XLSX"), "a_o-2024.XLSX");
        assert_eq!(super::sanitize_file_name("report"), "report.xls");
        assert_eq!(super::sanitize_file_name("report.csv"), "report.csv.xls");
    }

    #[test]
    fn has_extension() {
        assert!(super::has_extension("report.XLS", "xls"));
        assert!(super::has_extension(".xls", "xls"));
        assert!(!super::has_extension("report.xlsx", "xls"));
        assert!(!super::has_extension("xls", "xls"));
    }

    #[test]
    fn object_name() {
        let uploaded_at = date(2024, 3, 10).and_hms_opt(13, 4, 5).unwrap();

        assert_eq!(
            super::object_name("cmf-valores-cuota", date(2024, 3, 5), uploaded_at, "report.xls"),
            "cmf-valores-cuota/2024/03/05/20240310-130405-report.xls"
        );
    }

    #[test]
    fn content_type() {
        assert_eq!(super::content_type("report.xls"), "application/vnd.ms-excel");
        assert_eq!(
            super::content_type("report.XLSX"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }
}
