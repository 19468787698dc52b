// View models shared by the page templates: formatted prices, contact links,
// car cards, the detail gallery and select options. Templates only read
// precomputed strings from these.

use chrono::{Datelike, Utc};
use url::form_urlencoded;

use crate::config::Settings;
use crate::images::ResponsiveImage;
use crate::models::{Car, Testimonial};

/// `Rp 150.000.000`
pub fn format_rupiah(amount: i64) -> String {
    if amount < 0 {
        format!("-Rp {}", format_thousands(amount.unsigned_abs()))
    } else {
        format!("Rp {}", format_thousands(amount.unsigned_abs()))
    }
}

/// Groups digits by three with `.` separators (`45.000`).
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    grouped
}

// 08119288855 -> 0811-9288-855
fn format_phone(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 8 {
        return digits;
    }
    format!("{}-{}-{}", &digits[..4], &digits[4..8], &digits[8..])
}

/// Messaging deep link, optionally with a pre-filled message.
pub fn whatsapp_link(number: &str, message: Option<&str>) -> String {
    let number: String = number.chars().filter(char::is_ascii_digit).collect();
    match message {
        Some(message) => {
            // Percent-encode spaces rather than using '+'
            let text: String = form_urlencoded::byte_serialize(message.as_bytes()).collect();
            format!("https://wa.me/{}?text={}", number, text.replace('+', "%20"))
        }
        None => format!("https://wa.me/{}", number),
    }
}

pub fn inquiry_message(car: &Car) -> String {
    format!(
        "Halo, saya tertarik dengan {} {} {} yang dijual di website Anda. Boleh minta informasi lebih lanjut?",
        car.year, car.make, car.model
    )
}

#[derive(Debug, Clone, Copy)]
pub struct SalesContact {
    pub name: &'static str,
    pub number: &'static str,
}

impl SalesContact {
    pub fn whatsapp_link(&self) -> String {
        whatsapp_link(self.number, None)
    }
}

pub const SALES_CONTACTS: [SalesContact; 3] = [
    SalesContact { name: "Alfi", number: "+62 811-8297-666" },
    SalesContact { name: "Audy", number: "+62 811 1260 1717" },
    SalesContact { name: "Jimmy", number: "+62 811-9288-855" },
];

pub const SHOWROOM_ADDRESS: &str = "Ocean Park BSD City Unit FC10 - FC11, Jl. Pahlawan Seribu, Lengkong Gudang Tim., Kec. Serpong, Kota Tangerang Selatan, Banten 15310";
pub const OPENING_HOURS: &str = "Senin - Minggu: 8.00 am–5.00 pm";

/// The dealership's own numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub whatsapp_number: String,
    pub phone_number: String,
}

impl Contact {
    pub fn from_settings(settings: &Settings) -> Self {
        Contact {
            whatsapp_number: settings.whatsapp_number.clone(),
            phone_number: settings.phone_number.clone(),
        }
    }

    pub fn whatsapp_link(&self) -> String {
        whatsapp_link(&self.whatsapp_number, None)
    }

    pub fn inquiry_link(&self, car: &Car) -> String {
        whatsapp_link(&self.whatsapp_number, Some(&inquiry_message(car)))
    }

    pub fn tel_link(&self) -> String {
        format!("tel:{}", self.phone_number)
    }

    pub fn phone_display(&self) -> String {
        format_phone(&self.phone_number)
    }
}

#[derive(Debug, Clone)]
pub struct NavItem {
    pub name: &'static str,
    pub href: &'static str,
    pub active: bool,
}

const NAVIGATION: [(&str, &str); 5] = [
    ("Home", "/"),
    ("Mobil Kami", "/cars"),
    ("Tentang Kami", "/about"),
    ("Testimonial", "/testimonials"),
    ("Kontak", "/contact"),
];

#[derive(Debug, Clone)]
pub struct ContactLink {
    pub name: &'static str,
    pub number: &'static str,
    pub href: String,
}

/// Everything the base layout renders around a page.
#[derive(Debug, Clone)]
pub struct Layout {
    pub site_name: String,
    pub title: String,
    pub description: String,
    pub nav: Vec<NavItem>,
    pub phone_display: String,
    pub tel_link: String,
    pub whatsapp_link: String,
    pub sales: Vec<ContactLink>,
    pub address: &'static str,
    pub hours: &'static str,
    pub year: i32,
}

impl Layout {
    pub fn new(site_name: &str, contact: &Contact, path: &str, title: &str) -> Self {
        let title = if title.is_empty() {
            site_name.to_string()
        } else {
            format!("{} | {}", title, site_name)
        };
        Layout {
            site_name: site_name.to_string(),
            title,
            description: format!(
                "{} menyediakan mobil bekas berkualitas dengan kondisi terbaik, DP 0%, dan garansi buyback.",
                site_name
            ),
            nav: NAVIGATION
                .iter()
                .map(|&(name, href)| NavItem {
                    name,
                    href,
                    // "/cars/..." highlights "Mobil Kami", "/" only itself
                    active: href == path || (href != "/" && path.starts_with(href)),
                })
                .collect(),
            phone_display: contact.phone_display(),
            tel_link: contact.tel_link(),
            whatsapp_link: contact.whatsapp_link(),
            sales: SALES_CONTACTS
                .iter()
                .map(|c| ContactLink {
                    name: c.name,
                    number: c.number,
                    href: c.whatsapp_link(),
                })
                .collect(),
            address: SHOWROOM_ADDRESS,
            hours: OPENING_HOURS,
            year: Utc::now().year(),
        }
    }

    pub fn from_settings(settings: &Settings, path: &str, title: &str) -> Self {
        Self::new(&settings.site_name, &Contact::from_settings(settings), path, title)
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }
}

/// One car in a grid.
#[derive(Debug, Clone)]
pub struct CarCard {
    pub href: String,
    pub title: String,
    pub image: ResponsiveImage,
    pub price: String,
    pub market_price: Option<String>,
    pub transmission: &'static str,
    pub fuel_type: &'static str,
    pub year: i32,
    pub mileage: String,
    pub sold: bool,
    pub whatsapp_link: String,
}

impl CarCard {
    pub fn new(car: &Car, contact: &Contact) -> Self {
        let message = format!("Halo, saya tertarik dengan {} {} {}", car.year, car.make, car.model);
        CarCard {
            href: format!("/cars/{}", car.slug),
            title: car.title(),
            image: ResponsiveImage::new(&car.title_image),
            price: format_rupiah(car.price),
            market_price: car.discount().and(car.market_price).map(format_rupiah),
            transmission: car.transmission.label(),
            fuel_type: car.fuel_type.label(),
            year: car.year,
            mileage: format!("{} km", format_thousands(car.mileage.max(0) as u64)),
            sold: car.sold,
            whatsapp_link: whatsapp_link(&contact.whatsapp_number, Some(&message)),
        }
    }

    pub fn list(cars: &[Car], contact: &Contact) -> Vec<CarCard> {
        cars.iter().map(|car| CarCard::new(car, contact)).collect()
    }
}

/// Price comparison against the market price, shown only for discounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceComparison {
    pub price: String,
    pub market_price: String,
    pub savings: String,
    pub percent: i64,
}

impl PriceComparison {
    pub fn for_car(car: &Car) -> Option<Self> {
        let discount = car.discount()?;
        Some(PriceComparison {
            price: format_rupiah(car.price),
            market_price: format_rupiah(car.price + discount.amount),
            savings: format_rupiah(discount.amount),
            percent: discount.percent,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub label: &'static str,
    pub value: String,
}

pub fn specifications(car: &Car) -> Vec<Spec> {
    let spec = |label, value: String| Spec { label, value };
    vec![
        spec("Merek", car.make.clone()),
        spec("Model", car.model.clone()),
        spec("Tahun", car.year.to_string()),
        spec("Warna", car.color.clone()),
        spec("Transmisi", car.transmission.label().to_string()),
        spec("Bahan Bakar", car.fuel_type.label().to_string()),
        spec("Kilometer", format!("{} km", format_thousands(car.mileage.max(0) as u64))),
        spec("Nomor VIN", car.vin.clone()),
        spec("Kapasitas Mesin", format!("{} cc", car.engine_size)),
        spec("Tenaga", format!("{} HP", car.power)),
        spec("Jumlah Kursi", format!("{} Kursi", car.seats)),
        spec("Jumlah Pintu", format!("{} Pintu", car.doors)),
        spec("Kondisi", car.condition.label().to_string()),
    ]
}

pub fn meta_description(car: &Car) -> String {
    format!(
        "Beli {} bekas berkualitas dengan harga {}. Transmisi {}, Bahan Bakar {}, Kilometer {}.",
        car.title(),
        format_rupiah(car.price),
        car.transmission.label(),
        car.fuel_type.label(),
        format_thousands(car.mileage.max(0) as u64)
    )
}

/// Index over a car's images. Moving past either end wraps around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gallery {
    images: Vec<String>,
    index: usize,
    fullscreen: bool,
}

impl Gallery {
    pub fn new(images: Vec<String>) -> Self {
        Gallery {
            images,
            index: 0,
            fullscreen: false,
        }
    }

    /// Gallery addressed by `?image=N&fullscreen=1`; a bad index shows the
    /// first image.
    pub fn from_query(images: Vec<String>, query: &str) -> Self {
        let mut gallery = Gallery::new(images);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "image" => {
                    if let Ok(index) = value.trim().parse() {
                        gallery.select(index);
                    }
                }
                "fullscreen" => gallery.fullscreen = value == "1" || value == "true",
                _ => {}
            }
        }
        gallery
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn current(&self) -> Option<&str> {
        self.images.get(self.index).map(String::as_str)
    }

    pub fn next(&mut self) {
        if !self.images.is_empty() {
            self.index = (self.index + 1) % self.images.len();
        }
    }

    pub fn previous(&mut self) {
        if !self.images.is_empty() {
            self.index = (self.index + self.images.len() - 1) % self.images.len();
        }
    }

    /// Out-of-range indexes are ignored.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.images.len() {
            self.index = index;
            true
        } else {
            false
        }
    }

    pub fn open(&mut self) {
        self.fullscreen = !self.images.is_empty();
    }

    pub fn close(&mut self) {
        self.fullscreen = false;
    }

    pub fn view(&self, base: &str, title: &str) -> GalleryView {
        let href = |index: usize, fullscreen: bool| {
            if fullscreen {
                format!("{}?image={}&fullscreen=1", base, index)
            } else if index == 0 {
                base.to_string()
            } else {
                format!("{}?image={}", base, index)
            }
        };
        let step = |forward: bool| {
            let mut moved = self.clone();
            if forward {
                moved.next()
            } else {
                moved.previous()
            }
            href(moved.index, self.fullscreen)
        };

        GalleryView {
            current: self.current().map(ResponsiveImage::new),
            alt: format!("{} - Gambar {}", title, self.index + 1),
            counter: format!("{} / {}", self.index + 1, self.images.len()),
            previous_href: step(false),
            next_href: step(true),
            open_href: href(self.index, true),
            close_href: href(self.index, false),
            fullscreen: self.fullscreen,
            thumbnails: self
                .images
                .iter()
                .enumerate()
                .map(|(i, url)| Thumbnail {
                    href: href(i, self.fullscreen),
                    src: ResponsiveImage::new(url).thumbnail,
                    alt: format!("{} - Thumbnail {}", title, i + 1),
                    active: i == self.index,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub href: String,
    pub src: String,
    pub alt: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct GalleryView {
    pub current: Option<ResponsiveImage>,
    pub alt: String,
    pub counter: String,
    pub previous_href: String,
    pub next_href: String,
    pub open_href: String,
    pub close_href: String,
    pub fullscreen: bool,
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>, current: &str) -> Self {
        let value = value.into();
        let selected = value == current;
        SelectOption {
            value,
            label: label.into(),
            selected,
        }
    }

    /// Options whose label is their value.
    pub fn plain<T: ToString>(values: &[T], current: &str) -> Vec<Self> {
        values
            .iter()
            .map(|v| {
                let v = v.to_string();
                SelectOption::new(v.clone(), v, current)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TestimonialCard {
    pub name: String,
    pub location: String,
    pub stars: String,
    pub content: String,
    pub image: Option<String>,
    pub date: String,
}

impl TestimonialCard {
    pub fn new(testimonial: &Testimonial) -> Self {
        let stars = usize::from(testimonial.stars());
        TestimonialCard {
            name: testimonial.customer_name.clone(),
            location: testimonial.customer_location.clone(),
            stars: format!("{}{}", "★".repeat(stars), "☆".repeat(5 - stars)),
            content: testimonial.content.clone(),
            image: testimonial
                .image
                .as_deref()
                .map(|url| ResponsiveImage::new(url).medium),
            date: testimonial.created_at.format("%d/%m/%Y").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;

    fn car(overrides: serde_json::Value) -> Car {
        serde_json::from_value(fixtures::car_row("c9", "Toyota", "Avanza", 2018, 150_000_000, overrides)).unwrap()
    }

    #[test]
    fn rupiah_and_thousands() {
        assert_eq!(format_rupiah(150_000_000), "Rp 150.000.000");
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(999), "Rp 999");
        assert_eq!(format_rupiah(-5_000), "-Rp 5.000");
        assert_eq!(format_thousands(45_000), "45.000");
        assert_eq!(format_thousands(1_234_567), "1.234.567");
    }

    #[test]
    fn inquiry_link_carries_the_encoded_message() {
        let contact = Contact {
            whatsapp_number: "628119288855".into(),
            phone_number: "08119288855".into(),
        };
        let link = contact.inquiry_link(&car(serde_json::json!({})));
        assert!(link.starts_with("https://wa.me/628119288855?text=Halo%2C%20saya%20tertarik%20dengan%202018%20Toyota%20Avanza"));
        assert!(!link.contains('+'));
        assert_eq!(contact.tel_link(), "tel:08119288855");
        assert_eq!(contact.phone_display(), "0811-9288-855");
        assert_eq!(SALES_CONTACTS[1].whatsapp_link(), "https://wa.me/6281112601717");
    }

    #[test]
    fn card_shows_market_price_only_for_discounts() {
        let contact = Contact::from_settings(&Settings::defaults());
        let discounted = CarCard::new(&car(serde_json::json!({"market_price": 200_000_000})), &contact);
        assert_eq!(discounted.price, "Rp 150.000.000");
        assert_eq!(discounted.market_price.as_deref(), Some("Rp 200.000.000"));
        assert_eq!(discounted.href, "/cars/toyota-avanza-c9");
        assert_eq!(discounted.mileage, "45.000 km");

        let pricier_market = CarCard::new(&car(serde_json::json!({"market_price": 100_000_000})), &contact);
        assert_eq!(pricier_market.market_price, None);

        let comparison = PriceComparison::for_car(&car(serde_json::json!({"market_price": 200_000_000}))).unwrap();
        assert_eq!(comparison.savings, "Rp 50.000.000");
        assert_eq!(comparison.percent, 25);
    }

    #[test]
    fn gallery_wraps_and_ignores_bad_indexes() {
        let images: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut gallery = Gallery::new(images.clone());
        gallery.previous();
        assert_eq!(gallery.current(), Some("c"));
        gallery.next();
        assert_eq!(gallery.current(), Some("a"));
        assert!(!gallery.select(3));
        assert_eq!(gallery.index(), 0);

        let addressed = Gallery::from_query(images.clone(), "image=2&fullscreen=1");
        assert_eq!(addressed.current(), Some("c"));
        assert!(addressed.is_fullscreen());
        let view = addressed.view("/cars/x", "2018 Toyota Avanza");
        assert_eq!(view.next_href, "/cars/x?image=0&fullscreen=1");
        assert_eq!(view.close_href, "/cars/x?image=2");
        assert_eq!(view.counter, "3 / 3");

        let bad = Gallery::from_query(images, "image=7");
        assert_eq!(bad.index(), 0);

        let mut empty = Gallery::new(Vec::new());
        empty.next();
        empty.open();
        assert!(empty.current().is_none());
        assert!(!empty.is_fullscreen());
    }

    #[test]
    fn layout_marks_the_active_section() {
        let layout = Layout::from_settings(&Settings::defaults(), "/cars/honda-jazz-c3", "Honda Jazz");
        let active: Vec<&str> = layout.nav.iter().filter(|n| n.active).map(|n| n.href).collect();
        assert_eq!(active, vec!["/cars"]);
        assert_eq!(layout.title, "Honda Jazz | Power Auto ID");
    }
}
