/// Renders the renewal-notice message. Pure templating: same inputs always
/// produce the same bytes.
///
/// The recipient list is interpolated verbatim into the `To:` line, joined
/// with `;`. Duplicates are kept as-is; the caller decides the list.
#[derive(Debug, Clone)]
pub struct RenewalNotice {
    pub app_name: String,
    pub app_url: String,
}

impl RenewalNotice {
    pub fn render(&self, recipients: &[String], google_email: &str) -> String {
        format!(
            "Subject: Your {app_name} subscription is about to renew\n\
             To: {to}\n\
             Greetings from {app_name},\n\
             \n\
             Your subscription to the application {app_url} will automatically renew in less \
             than 30 days.\n\
             \n\
             The subscription was registered with the following Google account: {google_email}\n\
             \n\
             If you do not wish to stay subscribed to the application, please reply to this \
             message requesting cancellation of your subscription.\n\
             \n\
             In the event your payment method cannot be billed your subscription will be \
             automatically cancelled. You can then subscribe again inside the app.\n\
             \n\
             Cheers!\n\
             \n\
             The {app_name} team\n",
            app_name = self.app_name,
            app_url = self.app_url,
            to = recipients.join(";"),
            google_email = google_email,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> RenewalNotice {
        RenewalNotice {
            app_name: "Example App".to_string(),
            app_url: "https://app.example".to_string(),
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let recipients = vec!["a@x.com".to_string(), "b@x.com".to_string()];
        let first = notice().render(&recipients, "a@x.com");
        let second = notice().render(&recipients, "a@x.com");
        assert_eq!(first, second);
    }

    #[test]
    fn recipients_are_joined_with_semicolons() {
        let recipients = vec!["a@x.com".to_string(), "a@x.com".to_string()];
        let body = notice().render(&recipients, "a@x.com");
        assert!(body.contains("To: a@x.com;a@x.com\n"));
    }

    #[test]
    fn body_names_the_registered_account() {
        let body = notice().render(&["a@x.com".to_string()], "a@x.com");
        assert!(body.contains("Google account: a@x.com"));
        assert!(body.contains("https://app.example"));
    }
}
