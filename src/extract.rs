//! HTML extraction for listing and detail pages.
//!
//! Listing pages yield links to detail pages; a detail page yields one
//! [`CarDeal`] with every attribute filled in except the identifier.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{Error, Result};
use crate::types::CarDeal;

/// Parsed selectors for the listing and detail page layouts
pub struct DealExtractor {
    listing_link: Selector,
    container: Selector,
    left_row: Selector,
    right_row: Selector,
    row_key: Selector,
    row_value: Selector,
    icon: Selector,
    price_label: Selector,
    price_block: Selector,
    thumbnail: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Extraction(format!("invalid selector '{css}': {e}")))
}

impl DealExtractor {
    /// Compile every selector once
    pub fn new() -> Result<Self> {
        Ok(Self {
            listing_link: selector("figure.search-list-figure > a[href]")?,
            container: selector("div.container-main")?,
            left_row: selector("th.th-left")?,
            right_row: selector("th.th-right")?,
            row_key: selector("div.th-key")?,
            row_value: selector("div.th-value")?,
            icon: selector("i")?,
            price_label: selector("label > span")?,
            price_block: selector("div.price")?,
            thumbnail: selector("div.thumbnail-image > img")?,
        })
    }

    /// Absolute detail links on a listing page, in document order.
    ///
    /// Relative links resolve against `base`; unparseable ones are dropped.
    pub fn listing_links(&self, html: &str, base: &Url) -> Vec<Url> {
        let document = Html::parse_document(html);
        document
            .select(&self.listing_link)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match base.join(href.trim()) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!(href = href, error = %e, "Skipping unparseable detail link");
                    None
                }
            })
            .collect()
    }

    /// Build a deal from the detail page at `page`; `None` when it has no deal body.
    ///
    /// Thumbnail sources resolve against `page` like listing links do.
    pub fn parse_deal(&self, html: &str, page: &Url) -> Option<CarDeal> {
        let document = Html::parse_document(html);
        let main = document.select(&self.container).next()?;
        let mut deal = CarDeal::default();

        for row in main.select(&self.left_row) {
            let key = child_text(row, &self.row_key);
            let value = child_text(row, &self.row_value);
            apply_attribute(&mut deal, &key, value);
        }

        for row in main.select(&self.right_row) {
            if child_text(row, &self.row_key) == "Leather interior" {
                deal.leather_interior = row
                    .select(&self.icon)
                    .next()
                    .and_then(|i| i.value().attr("class"))
                    .is_some_and(|class| class.contains("fa-check"));
            }
        }

        for span in main.select(&self.price_label) {
            let text: String = span.text().collect();
            if text.contains('$') {
                deal.price = parse_price(&text);
            }
        }

        for block in main.select(&self.price_block) {
            let text: String = block.text().collect();
            deal.clearance = text.contains("Customs-cleared");
        }

        deal.image_urls = main
            .select(&self.thumbnail)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| match page.join(src.trim()) {
                Ok(url) => Some(String::from(url)),
                Err(e) => {
                    tracing::debug!(src = src, error = %e, "Skipping unparseable image source");
                    None
                }
            })
            .collect();

        Some(deal)
    }
}

/// Trimmed text of the first descendant matching `sel`, or empty
fn child_text(element: ElementRef<'_>, sel: &Selector) -> String {
    element
        .select(sel)
        .next()
        .map(|child| child.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn apply_attribute(deal: &mut CarDeal, key: &str, value: String) {
    match key {
        "Manufacturer" => deal.manufacturer = value,
        "Model" => deal.model = value,
        "Prod. year" => deal.year = value,
        "Category" => deal.category = value,
        "Fuel type" => deal.fuel_type = value,
        k if k.contains("Engine") => deal.engine_volume = clean_engine_volume(value),
        "Drive wheels" => deal.drive_wheels = value,
        "Mileage" => deal.mileage = clean_mileage(value),
        "Gear box type" => deal.gear_box = value,
        "Doors" => deal.doors = value,
        "Wheel" => deal.wheel = value,
        "Color" => deal.color = value,
        "Interior color" => deal.interior_color = value,
        "VIN" => deal.vin = value,
        _ => {}
    }
}

/// `"1.8 Turbo"` becomes `"1.8"`; values without `Turbo` pass through.
pub fn clean_engine_volume(value: String) -> String {
    if value.contains("Turbo") {
        value
            .replace("Turbo", "")
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\n'))
            .collect()
    } else {
        value
    }
}

/// `"125 000 km"` becomes `"125000"`; values without `km` pass through.
pub fn clean_mileage(value: String) -> String {
    if value.contains("km") {
        value.replace(' ', "").replace("km", "")
    } else {
        value
    }
}

/// Whole dollars from text like `"12,500 $"`; unparseable text is zero.
pub fn parse_price(text: &str) -> f32 {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '$' | ','))
        .collect();
    digits.parse::<i64>().map_or(0.0, |price| price as f32)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><body>
        <div class="container-main">
          <table>
            <tr><th class="th-left"><div class="th-key">Manufacturer</div><div class="th-value"> TOYOTA </div></th>
                <th class="th-right"><div class="th-key">Leather interior</div><div class="th-value"><i class="fa fa-check"></i></div></th></tr>
            <tr><th class="th-left"><div class="th-key">Model</div><div class="th-value">Prius</div></th>
                <th class="th-right"><div class="th-key">Hatch</div><div class="th-value"><i class="fa fa-times"></i></div></th></tr>
            <tr><th class="th-left"><div class="th-key">Prod. year</div><div class="th-value">2012</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Category</div><div class="th-value">Hatchback</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Mileage</div><div class="th-value">125 000 km</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Fuel type</div><div class="th-value">Hybrid</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Engine Volume</div><div class="th-value">1.8 Turbo</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Drive wheels</div><div class="th-value">Front</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Gear box type</div><div class="th-value">Automatic</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Doors</div><div class="th-value">4/5</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Wheel</div><div class="th-value">Left wheel</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Color</div><div class="th-value">Silver</div></th></tr>
            <tr><th class="th-left"><div class="th-key">Interior color</div><div class="th-value">Black</div></th></tr>
            <tr><th class="th-left"><div class="th-key">VIN</div><div class="th-value">JTDKN3DU5C1234567</div></th></tr>
          </table>
          <label><span>12,500 $</span></label>
          <label><span>Negotiable</span></label>
          <div class="price">Customs-cleared</div>
          <div class="thumbnail-image"><img src="https://static.example.ge/1/a.jpg?v=2"></div>
          <div class="thumbnail-image"><img src="https://static.example.ge/1/b.png"></div>
        </div>
        </body></html>
    "#;

    fn page() -> Url {
        Url::parse("https://www.myauto.ge/en/pr/100/toyota-prius").unwrap()
    }

    #[test]
    fn parses_every_detail_attribute() {
        let extractor = DealExtractor::new().unwrap();
        let deal = extractor.parse_deal(DETAIL, &page()).expect("detail page should parse");

        assert_eq!(deal.manufacturer, "TOYOTA");
        assert_eq!(deal.model, "Prius");
        assert_eq!(deal.year, "2012");
        assert_eq!(deal.category, "Hatchback");
        assert_eq!(deal.mileage, "125000");
        assert_eq!(deal.fuel_type, "Hybrid");
        assert_eq!(deal.engine_volume, "1.8");
        assert_eq!(deal.drive_wheels, "Front");
        assert_eq!(deal.gear_box, "Automatic");
        assert_eq!(deal.doors, "4/5");
        assert_eq!(deal.wheel, "Left wheel");
        assert_eq!(deal.color, "Silver");
        assert_eq!(deal.interior_color, "Black");
        assert_eq!(deal.vin, "JTDKN3DU5C1234567");
        assert!(deal.leather_interior);
        assert_eq!(deal.price, 12_500.0);
        assert!(deal.clearance);
        assert_eq!(
            deal.image_urls,
            vec!["https://static.example.ge/1/a.jpg?v=2", "https://static.example.ge/1/b.png"]
        );
    }

    #[test]
    fn page_without_container_yields_nothing() {
        let extractor = DealExtractor::new().unwrap();
        assert!(extractor.parse_deal("<html><body><p>404</p></body></html>", &page()).is_none());
    }

    #[test]
    fn relative_thumbnails_resolve_against_the_page() {
        let extractor = DealExtractor::new().unwrap();
        let html = r#"<div class="container-main">
            <div class="thumbnail-image"><img src="/img/1/a.jpg"></div>
            <div class="thumbnail-image"><img src="thumbs/b.png"></div>
            <div class="thumbnail-image"><img src="//cdn.example.ge/c.webp"></div>
        </div>"#;

        let deal = extractor.parse_deal(html, &page()).unwrap();
        assert_eq!(
            deal.image_urls,
            vec![
                "https://www.myauto.ge/img/1/a.jpg",
                "https://www.myauto.ge/en/pr/100/thumbs/b.png",
                "https://cdn.example.ge/c.webp"
            ]
        );
    }

    #[test]
    fn listing_links_resolve_against_base() {
        let extractor = DealExtractor::new().unwrap();
        let html = r#"
            <figure class="search-list-figure"><a href="/en/pr/100/toyota-prius">x</a></figure>
            <figure class="search-list-figure"><a href="https://www.myauto.ge/en/pr/101/bmw">y</a></figure>
            <figure class="other"><a href="/ignored">z</a></figure>
        "#;
        let base = Url::parse("https://www.myauto.ge/en/s/for-sale-cars?page=1").unwrap();

        let links: Vec<String> = extractor
            .listing_links(html, &base)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://www.myauto.ge/en/pr/100/toyota-prius",
                "https://www.myauto.ge/en/pr/101/bmw"
            ]
        );
    }

    #[test]
    fn value_cleanup_rules() {
        assert_eq!(clean_engine_volume("2.0 \tTurbo\n".to_string()), "2.0");
        assert_eq!(clean_engine_volume("2.0 L".to_string()), "2.0 L");
        assert_eq!(clean_mileage("98 765 km".to_string()), "98765");
        assert_eq!(clean_mileage("98 765 mi".to_string()), "98 765 mi");
        assert_eq!(parse_price("1 234,567 $"), 1_234_567.0);
        assert_eq!(parse_price("Price on request $"), 0.0);
    }
}
