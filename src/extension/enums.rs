//! Shared enums handed to every provider through its context
//!
//! Each enum carries the key scripts use (`StreamingServers.VidCloud`) and the
//! wire value they compare against (`"vidcloud"`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $ns:literal {
            $($variant:ident => ($key:literal, $value:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name of this enum inside the script namespace
            pub const NAMESPACE: &'static str = $ns;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            /// Property name scripts use to reach this value
            pub fn key(&self) -> &'static str {
                match self {
                    $($name::$variant => $key,)+
                }
            }

            /// Resolve either the script key or the wire value
            pub fn parse(s: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s) || v.key() == s)
            }

            fn namespace_object() -> Value {
                let mut map = Map::new();
                for v in Self::ALL {
                    map.insert(v.key().to_string(), Value::String(v.as_str().to_string()));
                }
                Value::Object(map)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Video hosts an extractor can be registered for
    StreamingServer as "StreamingServers" {
        AsianLoad => ("AsianLoad", "asianload"),
        GogoCdn => ("GogoCDN", "gogocdn"),
        StreamSb => ("StreamSB", "streamsb"),
        MixDrop => ("MixDrop", "mixdrop"),
        Mp4Upload => ("Mp4Upload", "mp4upload"),
        UpCloud => ("UpCloud", "upcloud"),
        VidCloud => ("VidCloud", "vidcloud"),
        StreamTape => ("StreamTape", "streamtape"),
        VizCloud => ("VizCloud", "vizcloud"),
        MyCloud => ("MyCloud", "mycloud"),
        Filemoon => ("Filemoon", "filemoon"),
        VidStreaming => ("VidStreaming", "vidstreaming"),
        StreamWish => ("StreamWish", "streamwish"),
        VidMoly => ("VidMoly", "vidmoly"),
        Voe => ("Voe", "voe"),
        MegaCloud => ("MegaCloud", "megacloud"),
        MegaUp => ("MegaUp", "megaup"),
        Kwik => ("Kwik", "kwik"),
        SmashyStream => ("SmashyStream", "smashystream"),
        BuiltIn => ("BuiltIn", "builtin"),
    }
}

wire_enum! {
    MediaFormat as "MediaFormat" {
        Tv => ("TV", "TV"),
        TvShort => ("TV_SHORT", "TV_SHORT"),
        Movie => ("MOVIE", "MOVIE"),
        Special => ("SPECIAL", "SPECIAL"),
        Ova => ("OVA", "OVA"),
        Ona => ("ONA", "ONA"),
        Music => ("MUSIC", "MUSIC"),
        Manga => ("MANGA", "MANGA"),
        Novel => ("NOVEL", "NOVEL"),
        OneShot => ("ONE_SHOT", "ONE_SHOT"),
    }
}

wire_enum! {
    MediaStatus as "MediaStatus" {
        Ongoing => ("ONGOING", "Ongoing"),
        Completed => ("COMPLETED", "Completed"),
        Hiatus => ("HIATUS", "Hiatus"),
        Cancelled => ("CANCELLED", "Cancelled"),
        NotYetAired => ("NOT_YET_AIRED", "Not yet aired"),
        Unknown => ("UNKNOWN", "Unknown"),
    }
}

wire_enum! {
    SubOrDub as "SubOrDub" {
        Sub => ("SUB", "sub"),
        Dub => ("DUB", "dub"),
        Both => ("BOTH", "both"),
    }
}

wire_enum! {
    WatchListType as "WatchListType" {
        Watching => ("WATCHING", "watching"),
        OnHold => ("ONHOLD", "on-hold"),
        PlanToWatch => ("PLAN_TO_WATCH", "plan to watch"),
        Dropped => ("DROPPED", "dropped"),
        Completed => ("COMPLETED", "completed"),
        None => ("NONE", "none"),
    }
}

wire_enum! {
    TvType as "TvType" {
        TvSeries => ("TVSERIES", "TV Series"),
        Movie => ("MOVIE", "Movie"),
        Anime => ("ANIME", "Anime"),
        Peliculas => ("PELICULAS", "Peliculas"),
        Series => ("SERIES", "Series"),
    }
}

wire_enum! {
    Genre as "Genres" {
        Action => ("ACTION", "Action"),
        Adventure => ("ADVENTURE", "Adventure"),
        Cars => ("CARS", "Cars"),
        Comedy => ("COMEDY", "Comedy"),
        Drama => ("DRAMA", "Drama"),
        Fantasy => ("FANTASY", "Fantasy"),
        Horror => ("HORROR", "Horror"),
        MahouShoujo => ("MAHOU_SHOUJO", "Mahou Shoujo"),
        Mecha => ("MECHA", "Mecha"),
        Music => ("MUSIC", "Music"),
        Mystery => ("MYSTERY", "Mystery"),
        Psychological => ("PSYCHOLOGICAL", "Psychological"),
        Romance => ("ROMANCE", "Romance"),
        SciFi => ("SCI_FI", "Sci-Fi"),
        SliceOfLife => ("SLICE_OF_LIFE", "Slice of Life"),
        Sports => ("SPORTS", "Sports"),
        Supernatural => ("SUPERNATURAL", "Supernatural"),
        Thriller => ("THRILLER", "Thriller"),
    }
}

wire_enum! {
    Topic as "Topics" {
        Anime => ("ANIME", "anime"),
        Animation => ("ANIMATION", "animation"),
        Manga => ("MANGA", "manga"),
        Games => ("GAMES", "games"),
        Novels => ("NOVELS", "novels"),
        LiveAction => ("LIVE_ACTION", "live-action"),
        Covid19 => ("COVID_19", "covid-19"),
        Industry => ("INDUSTRY", "industry"),
        Music => ("MUSIC", "music"),
        People => ("PEOPLE", "people"),
        Merch => ("MERCH", "merch"),
        Events => ("EVENTS", "events"),
    }
}

/// Enum namespace exposed to scripts as `ctx.enums`
pub fn namespace() -> Value {
    let mut map = Map::new();
    map.insert(StreamingServer::NAMESPACE.into(), StreamingServer::namespace_object());
    map.insert(MediaFormat::NAMESPACE.into(), MediaFormat::namespace_object());
    map.insert(MediaStatus::NAMESPACE.into(), MediaStatus::namespace_object());
    map.insert(SubOrDub::NAMESPACE.into(), SubOrDub::namespace_object());
    map.insert(WatchListType::NAMESPACE.into(), WatchListType::namespace_object());
    map.insert(TvType::NAMESPACE.into(), TvType::namespace_object());
    map.insert(Genre::NAMESPACE.into(), Genre::namespace_object());
    map.insert(Topic::NAMESPACE.into(), Topic::namespace_object());
    Value::Object(map)
}
