//! Fixed copy for the designed chat states (greeting, limit reached, service
//! unavailable). Everything else shown in the chat comes from the backend.

use crate::model::Language;

/// Greeting that opens a fresh session.
pub fn welcome(language: Language, has_context: bool) -> &'static str {
    match (language, has_context) {
        (Language::En, true) => {
            "Your chart is loaded. Ask me anything about your career, relationships or health."
        }
        (Language::En, false) => "Namaste! Ask me anything about your stars.",
        (Language::Hi, true) => {
            "आपकी कुंडली लोड हो गई है। करियर, संबंध या स्वास्थ्य के बारे में कुछ भी पूछें।"
        }
        (Language::Hi, false) => "नमस्ते! अपने सितारों के बारे में कुछ भी पूछें।",
    }
}

/// Shown when the daily message quota is spent.
pub fn limit_reached(language: Language, limit: u32) -> String {
    match language {
        Language::En => format!(
            "You've used all {limit} free messages today. Watch an ad for more or upgrade to premium."
        ),
        Language::Hi => format!(
            "आज के {limit} मुफ्त संदेश पूरे। विज्ञापन देखकर और संदेश पाएं या प्रीमियम लें।"
        ),
    }
}

/// Shown when every tier failed.
pub fn service_unavailable(language: Language) -> &'static str {
    match language {
        Language::En => "AI isn't available here. Download the app to use full AI features.",
        Language::Hi => "यहाँ AI उपलब्ध नहीं है। पूर्ण AI सुविधाओं के लिए ऐप डाउनलोड करें।",
    }
}
