//! Catalog content served by simulated sources.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Value, json};

/// One title in a simulated catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    pub year: u32,
    pub area: String,
    pub type_name: String,
    pub director: String,
    pub actors: Vec<String>,
    pub synopsis: String,
    pub episodes: u32,
}

impl CatalogEntry {
    /// Entry with placeholder metadata.
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            year: 2020,
            area: "Unknown".to_string(),
            type_name: "Movie".to_string(),
            director: "Unknown".to_string(),
            actors: Vec::new(),
            synopsis: String::new(),
            episodes: 1,
        }
    }

    pub fn with_episodes(mut self, episodes: u32) -> Self {
        self.episodes = episodes.max(1);
        self
    }

    /// Renders the entry in the upstream list-item shape.
    ///
    /// `rng` decides whether numeric fields are sent as numbers or strings,
    /// the way real upstreams disagree.
    pub(crate) fn to_list_item(&self, rng: &mut ChaCha8Rng, with_play_urls: bool) -> Value {
        let id = if rng.random_bool(0.5) {
            json!(self.id)
        } else {
            json!(self.id.to_string())
        };
        let year = if rng.random_bool(0.5) {
            json!(self.year)
        } else {
            json!(self.year.to_string())
        };
        let remarks = if self.episodes > 1 {
            format!("{} episodes", self.episodes)
        } else {
            ["HD", "1080p", "BD"][rng.random_range(0..3)].to_string()
        };

        let mut item = json!({
            "vod_id": id,
            "vod_name": self.title,
            "vod_pic": format!("https://img.example/{}.jpg", self.id),
            "vod_remarks": remarks,
            "vod_year": year,
            "vod_area": self.area,
            "type_name": self.type_name,
            "vod_director": self.director,
            "vod_actor": self.actors.join(","),
            "vod_content": format!("<p>{}</p>", self.synopsis),
            "vod_lang": "English",
        });

        if with_play_urls {
            item["vod_play_from"] = json!("web$$$sim_m3u8");
            item["vod_play_url"] = json!(format!(
                "{}$$${}",
                self.play_group("https://web.example", "html"),
                self.play_group("https://cdn.example", "m3u8")
            ));
        }
        item
    }

    fn play_group(&self, host: &str, extension: &str) -> String {
        (1..=self.episodes)
            .map(|episode| format!("EP{episode:02}${host}/{}/{episode}.{extension}", self.id))
            .collect::<Vec<_>>()
            .join("#")
    }
}

fn entry(
    id: u64,
    title: &str,
    year: u32,
    type_name: &str,
    director: &str,
    synopsis: &str,
) -> CatalogEntry {
    CatalogEntry {
        id,
        title: title.to_string(),
        year,
        area: "Netherlands".to_string(),
        type_name: type_name.to_string(),
        director: director.to_string(),
        actors: Vec::new(),
        synopsis: synopsis.to_string(),
        episodes: 1,
    }
}

/// Default catalog of open movie titles.
pub fn create_default_catalog() -> Vec<CatalogEntry> {
    vec![
        entry(1, "Big Buck Bunny", 2008, "Animation", "Sacha Goedegebure", "A giant rabbit takes revenge on three bullies."),
        entry(2, "Elephants Dream", 2006, "Animation", "Bassam Kurdali", "Two characters explore a surreal machine world."),
        entry(3, "Sintel", 2010, "Animation", "Colin Levy", "A girl searches for her lost dragon."),
        entry(4, "Tears of Steel", 2012, "Sci-Fi", "Ian Hubert", "Scientists try to save the world with a memory."),
        entry(5, "Cosmos Laundromat", 2015, "Animation", "Mathieu Auvray", "A suicidal sheep meets a mysterious salesman."),
        entry(6, "Spring", 2019, "Animation", "Andy Goralczyk", "A shepherd girl and her dog face ancient spirits."),
        entry(7, "Agent 327: Operation Barbershop", 2017, "Animation", "Colin Levy", "A secret agent goes undercover in a barbershop."),
        entry(8, "Caminandes: Llama Drama", 2013, "Animation", "Pablo Vazquez", "A llama tries to cross a road."),
        entry(9, "Caminandes: Gran Dillama", 2013, "Animation", "Pablo Vazquez", "A llama wants the grass on the other side."),
        entry(10, "Caminandes: Llamigos", 2016, "Animation", "Pablo Vazquez", "A llama and a penguin fight over berries."),
        entry(11, "Glass Half", 2015, "Comedy", "Beorn Leonard", "Two art critics disagree in a gallery."),
        entry(12, "Hero", 2018, "Animation", "Daniel Martinez Lara", "A showcase of grease pencil animation."),
        entry(13, "Charge", 2022, "Action", "Hjalti Hjalmarsson", "An old man fights for the last energy source."),
        entry(14, "Sprite Fright", 2021, "Horror", "Matthew Luhn", "Teenagers meet the wrong forest creatures."),
        CatalogEntry {
            episodes: 6,
            ..entry(15, "Caminandes Collection", 2016, "Series", "Pablo Vazquez", "Every llama adventure in one place.")
        },
    ]
}
