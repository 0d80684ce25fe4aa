//! Prompts sent to the vision / chat oracle.
//!
//! Every prompt lives here so the wording can change without touching the
//! request, parsing or error-handling code, and so tests can inspect the
//! exact contract the oracle is given. Callers can override the recognition
//! system prompt via [`crate::config::IngestConfig::system_prompt`].

/// System prompt for garment detection.
pub const RECOGNITION_SYSTEM_PROMPT: &str = r#"You are a meticulous fashion cataloguer. You look at a photo and list every distinct clothing item or accessory that is clearly visible.

Rules:
1. One entry per physical item. A pair of shoes is one item.
2. Ignore people, furniture, hangers and background objects.
3. If no clothing is visible, return an empty list.
4. Bounding boxes use a 0-1000 scale relative to the image, ordered [ymin, xmin, ymax, xmax].
5. Respond with JSON only. No prose, no Markdown fences."#;

/// User-turn instruction attached to each photo.
pub const RECOGNITION_INSTRUCTION: &str = r#"Analyze this image and identify all distinct clothing items.
Return a JSON object of the form {"items": [...]} where each element has:
  "name":        short descriptive name, e.g. "Navy Oxford Shirt"
  "category":    one of "shirt", "pants", "accessory", "shoes", "other"
  "silhouette":  garment shape, e.g. "tee", "hoodie", "jeans", "sneakers", "boots", "jacket"
  "color":       human colour name
  "hexColor":    dominant colour as #RRGGBB
  "material":    e.g. "Cotton", "Denim", "Leather"
  "pattern":     e.g. "Solid", "Striped", "Plaid"
  "style":       e.g. "Casual", "Formal", "Sporty"
  "season":      e.g. "Summer", "Winter", "All-season"
  "description": one sentence
  "box_2d":      [ymin, xmin, ymax, xmax] on a 0-1000 scale"#;

/// System prompt for the stylist chat, embedding a compact wardrobe listing.
///
/// `wardrobe_json` is a JSON array of `{id, name, category, color}` objects.
pub fn stylist_context(wardrobe_json: &str) -> String {
    format!(
        r#"You are a stylish best friend helping someone dress from their own closet.
Only recommend items that exist in the WARDROBE below and refer to them by id.

WARDROBE: {wardrobe_json}

Respond with JSON only, in the form {{"text": "your message", "itemIds": ["id1", "id2"]}}.
Use an empty itemIds array when you are not suggesting specific items."#
    )
}

/// Prompt for wardrobe-complementing shopping suggestions.
///
/// `style_summary` is a comma-separated list of `"<color> <style> <category>"`
/// entries. `feedback` holds `"<product>: <note>"` lines from earlier rounds.
pub fn shopping_prompt(style_summary: &str, tier: &str, location: Option<&str>, feedback: &[String]) -> String {
    let region = location.unwrap_or("Global");
    let feedback_block = if feedback.is_empty() {
        String::new()
    } else {
        format!(
            "\nThe user reacted to earlier suggestions; respect these notes:\n- {}\n",
            feedback.join("\n- ")
        )
    };
    format!(
        r##"Act as a professional fashion buyer. Suggest 10 products that complement this wardrobe: {style_summary}.

Constraints:
1. Price range: strictly "{tier}" pricing for {region}.
2. Only real, currently sold products. Each "url" must be a direct product page, never a search result, homepage or blog.
3. "imageUrl" must show that exact product. Omit it when unsure; never use a generic category image.
4. Do not suggest items the wardrobe already covers.
{feedback_block}
Respond with JSON only, in the form:
{{
  "advice": "Short trend advice for this wardrobe.",
  "products": [
    {{
      "id": "unique_string",
      "name": "Exact product name",
      "price": "Price with currency",
      "store": "Brand or retailer",
      "url": "https://...",
      "imageUrl": "https://...",
      "reason": "Why this is the missing piece for their closet.",
      "silhouette": "tee/jeans/hoodie/sneakers/boots/jacket",
      "hexColor": "#RRGGBB"
    }}
  ]
}}"##
    )
}
